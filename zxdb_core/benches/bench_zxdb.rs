use divan::{black_box, Bencher};
use zxdb_core::debugger::parser::parse_expression;
use zxdb_core::debugger::Debugger;
use zxdb_core::FlatMachine;

fn main() {
    divan::main();
}

fn debugger_with_breakpoints(machine: &mut FlatMachine, count: u16) -> Debugger {
    let mut debugger = Debugger::default();
    for index in 0..count {
        let command = format!("break 0x{:04X}", 0x4000 + index * 3);
        debugger.dispatch(&command, machine).unwrap();
    }
    debugger
}

// The common case: nothing set at the current PC
#[divan::bench(args = [0, 16, 256])]
fn check_execute_miss(bencher: Bencher, count: u16) {
    let mut machine = FlatMachine::new();
    let mut debugger = debugger_with_breakpoints(&mut machine, count);

    let mut pc: u16 = 0x8000;
    bencher.bench_local(|| {
        pc = pc.wrapping_add(1) | 0x8000;
        black_box(debugger.check_execute(black_box(pc), &mut machine))
    });
}

#[divan::bench]
fn check_execute_false_condition(bencher: Bencher) {
    let mut machine = FlatMachine::new();
    let mut debugger = Debugger::default();
    debugger
        .dispatch("break 0x8000 if [hl] == 0xff && sp < 0x4000", &mut machine)
        .unwrap();

    bencher.bench_local(|| black_box(debugger.check_execute(black_box(0x8000), &mut machine)));
}

#[divan::bench]
fn check_memory_access_ranged(bencher: Bencher) {
    let mut machine = FlatMachine::new();
    let mut debugger = Debugger::default();
    debugger.dispatch("break write 0x4000, 0x57ff if a == 1", &mut machine).unwrap();

    let mut address: u16 = 0;
    bencher.bench_local(|| {
        address = address.wrapping_add(7);
        black_box(debugger.check_memory_access(address, true, &mut machine))
    });
}

#[divan::bench]
fn parse_condition() -> usize {
    let expression = parse_expression(black_box("!a == b || [hl + 1] != port[0xfe] && sp >= 0xff00")).unwrap();
    black_box(expression).to_string().len()
}
