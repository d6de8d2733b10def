use crate::errors::EvalError;
use crate::machine::{Machine, Register, Word};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Not,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    LogicalOr,
    LogicalAnd,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Not => "!",
            UnaryOperator::Plus => "+",
        }
    }
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        use self::BinaryOperator::*;

        match self {
            LogicalOr => "||",
            LogicalAnd => "&&",
            Less => "<",
            Greater => ">",
            LessEqual => "<=",
            GreaterEqual => ">=",
            Equal => "==",
            NotEqual => "!=",
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
        }
    }

    // `rhs` is only run when the operator needs it, so `||`/`&&` short-circuit
    fn apply<F>(self, lhs: Word, rhs: F) -> Result<Word, EvalError>
    where
        F: FnOnce() -> Result<Word, EvalError>,
    {
        use self::BinaryOperator::*;

        let value = match self {
            LogicalOr => (lhs != 0 || rhs()? != 0) as Word,
            LogicalAnd => (lhs != 0 && rhs()? != 0) as Word,
            Less => (lhs < rhs()?) as Word,
            Greater => (lhs > rhs()?) as Word,
            LessEqual => (lhs <= rhs()?) as Word,
            GreaterEqual => (lhs >= rhs()?) as Word,
            Equal => (lhs == rhs()?) as Word,
            NotEqual => (lhs != rhs()?) as Word,
            Add => lhs.wrapping_add(rhs()?),
            Subtract => lhs.wrapping_sub(rhs()?),
            Multiply => lhs.wrapping_mul(rhs()?),
            Divide => lhs.checked_div(rhs()?).ok_or(EvalError::DivisionByZero)?,
        };

        Ok(value)
    }
}

/// A compiled debugger expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Number(Word),
    Register(Register),
    MemoryRead(Box<Expression>),
    PortRead(Box<Expression>),
    Unary(UnaryOperator, Box<Expression>),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn unary(operator: UnaryOperator, operand: Expression) -> Expression {
        Expression::Unary(operator, Box::new(operand))
    }

    pub fn binary(operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(operator, Box::new(lhs), Box::new(rhs))
    }

    /// Evaluates against the live machine. Memory and port reads happen in
    /// the order they appear, and the right-hand side of `||`/`&&` is only
    /// read when the left-hand side does not decide the result.
    pub fn evaluate<M: Machine + ?Sized>(&self, machine: &mut M) -> Result<Word, EvalError> {
        match self {
            Expression::Number(value) => Ok(*value),
            // Only the low word of the cycle counter is visible
            Expression::Register(Register::Tstates) => Ok(machine.current_cycle_count() as Word),
            Expression::Register(register) => machine
                .read_register(*register)
                .ok_or(EvalError::UnknownRegister(*register)),
            Expression::MemoryRead(address) => {
                let address = address.evaluate(machine)? as u16;
                Ok(machine.read_memory(address) as Word)
            }
            Expression::PortRead(port) => {
                let port = port.evaluate(machine)? as u16;
                Ok(machine.read_port(port) as Word)
            }
            Expression::Unary(operator, operand) => {
                let value = operand.evaluate(machine)?;
                let result = match operator {
                    UnaryOperator::Negate => value.wrapping_neg(),
                    UnaryOperator::Not => (value == 0) as Word,
                    UnaryOperator::Plus => value,
                };
                Ok(result)
            }
            Expression::Binary(operator, lhs, rhs) => {
                let lhs = lhs.evaluate(machine)?;
                operator.apply(lhs, || rhs.evaluate(machine))
            }
        }
    }
}

// Prints fully parenthesised source, so the output parses back to the same tree
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Number(value) => write!(f, "{}", value),
            Expression::Register(register) => write!(f, "{}", register),
            Expression::MemoryRead(address) => write!(f, "[{}]", address),
            Expression::PortRead(port) => write!(f, "port[{}]", port),
            Expression::Unary(operator, operand) => write!(f, "({}{})", operator.symbol(), operand),
            Expression::Binary(operator, lhs, rhs) => {
                write!(f, "({} {} {})", lhs, operator.symbol(), rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BinaryOperator::*;
    use super::*;
    use crate::machine::{CountingMachine, FlatMachine};
    use crate::memory::MemMapped;

    fn number(value: Word) -> Expression {
        Expression::Number(value)
    }

    #[test]
    fn logical_operators_yield_zero_or_one() {
        let mut machine = FlatMachine::new();

        let or = Expression::binary(LogicalOr, number(0), number(7));
        let and = Expression::binary(LogicalAnd, number(3), number(9));
        let not = Expression::unary(UnaryOperator::Not, number(42));

        assert_eq!(or.evaluate(&mut machine), Ok(1));
        assert_eq!(and.evaluate(&mut machine), Ok(1));
        assert_eq!(not.evaluate(&mut machine), Ok(0));
    }

    #[test]
    fn arithmetic_wraps_at_word_width() {
        let mut machine = FlatMachine::new();

        let underflow = Expression::binary(Subtract, number(0), number(1));
        let negate = Expression::unary(UnaryOperator::Negate, number(1));
        let overflow = Expression::binary(Multiply, number(0x8000_0000), number(2));

        assert_eq!(underflow.evaluate(&mut machine), Ok(Word::MAX));
        assert_eq!(negate.evaluate(&mut machine), Ok(Word::MAX));
        assert_eq!(overflow.evaluate(&mut machine), Ok(0));
    }

    #[test]
    fn comparisons_use_the_full_word() {
        let mut machine = FlatMachine::new();

        // -1 is the largest word, not a negative number
        let minus_one = Expression::unary(UnaryOperator::Negate, number(1));
        let greater = Expression::binary(Greater, minus_one, number(0xFFFF));

        assert_eq!(greater.evaluate(&mut machine), Ok(1));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut machine = FlatMachine::new();
        let expression = Expression::binary(Divide, number(1), number(0));

        assert_eq!(expression.evaluate(&mut machine), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn reads_registers_memory_and_ports() {
        let mut machine = FlatMachine::new();
        machine.registers.set(Register::Hl, 0x4000);
        machine.memory.ram[0x4000] = 0x99;
        machine.ports.write(0x00FE, 0x1F);
        machine.tstates = 224;

        let memory = Expression::MemoryRead(Box::new(Expression::Register(Register::Hl)));
        let port = Expression::PortRead(Box::new(number(0xFE)));
        let cycles = Expression::Register(Register::Tstates);

        assert_eq!(memory.evaluate(&mut machine), Ok(0x99));
        assert_eq!(port.evaluate(&mut machine), Ok(0x1F));
        assert_eq!(cycles.evaluate(&mut machine), Ok(224));
    }

    #[test]
    fn addresses_use_the_low_sixteen_bits() {
        let mut machine = FlatMachine::new();
        machine.memory.ram[0x0001] = 0x55;

        let expression = Expression::MemoryRead(Box::new(number(0x1_0001)));
        assert_eq!(expression.evaluate(&mut machine), Ok(0x55));
    }

    #[test]
    fn logical_and_skips_reads_on_false_lhs() {
        let mut machine = CountingMachine::default();
        let guarded = Expression::binary(
            LogicalAnd,
            number(0),
            Expression::MemoryRead(Box::new(number(0x5C00))),
        );

        assert_eq!(guarded.evaluate(&mut machine), Ok(0));
        assert_eq!(machine.memory_reads, 0);
    }

    #[test]
    fn logical_or_skips_reads_on_true_lhs() {
        let mut machine = CountingMachine::default();
        let guarded = Expression::binary(
            LogicalOr,
            number(1),
            Expression::PortRead(Box::new(number(0xFE))),
        );

        assert_eq!(guarded.evaluate(&mut machine), Ok(1));
        assert_eq!(machine.port_reads, 0);

        let unguarded = Expression::binary(
            LogicalOr,
            number(0),
            Expression::PortRead(Box::new(number(0xFE))),
        );
        assert_eq!(unguarded.evaluate(&mut machine), Ok(1));
        assert_eq!(machine.port_reads, 1);
    }

    #[test]
    fn errors_in_skipped_operands_are_not_raised() {
        let mut machine = FlatMachine::new();
        let guarded = Expression::binary(
            LogicalAnd,
            number(0),
            Expression::binary(Divide, number(1), number(0)),
        );

        assert_eq!(guarded.evaluate(&mut machine), Ok(0));
    }

    #[test]
    fn missing_registers_are_reported() {
        struct NoIndexRegisters(FlatMachine);

        impl Machine for NoIndexRegisters {
            fn read_register(&self, register: Register) -> Option<Word> {
                match register {
                    Register::Ix | Register::Iy => None,
                    _ => self.0.read_register(register),
                }
            }
            fn write_register(&mut self, register: Register, value: Word) -> bool {
                self.0.write_register(register, value)
            }
            fn read_memory(&mut self, address: u16) -> u8 {
                self.0.read_memory(address)
            }
            fn write_memory(&mut self, address: u16, byte: u8) {
                self.0.write_memory(address, byte)
            }
            fn read_port(&mut self, port: u16) -> u8 {
                self.0.read_port(port)
            }
            fn write_port(&mut self, port: u16, byte: u8) {
                self.0.write_port(port, byte)
            }
            fn current_cycle_count(&self) -> u64 {
                0
            }
        }

        let mut machine = NoIndexRegisters(FlatMachine::new());
        let expression = Expression::Register(Register::Ix);

        assert_eq!(
            expression.evaluate(&mut machine),
            Err(EvalError::UnknownRegister(Register::Ix))
        );
    }

    #[test]
    fn display_is_fully_parenthesised() {
        let expression = Expression::binary(
            LogicalAnd,
            Expression::binary(Equal, Expression::Register(Register::A), number(5)),
            Expression::unary(
                UnaryOperator::Not,
                Expression::PortRead(Box::new(number(254))),
            ),
        );

        assert_eq!(expression.to_string(), "((a == 5) && (!port[254]))");
    }
}
