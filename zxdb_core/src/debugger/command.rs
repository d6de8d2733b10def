use crate::debugger::breakpoint::{BreakpointId, BreakpointKind, BreakpointLife};
use crate::debugger::expression::Expression;
use crate::debugger::lexer::{tokenize, Keyword, Token};
use crate::debugger::parser::Parser;
use crate::errors::{DebuggerError, ParseError};
use crate::machine::Register;

/// Where a `break`/`tbreak` command wants its breakpoint. Expressions are
/// kept unevaluated until the command is executed against a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointTarget {
    /// `start` defaults to the program counter; `end` makes it a range.
    Address {
        kind: BreakpointKind,
        page: Option<Expression>,
        start: Option<Expression>,
        end: Option<Expression>,
    },
    Port {
        write: bool,
        port: Expression,
    },
    Time(Expression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Base(Expression),
    Breakpoint {
        life: BreakpointLife,
        target: BreakpointTarget,
        condition: Option<Expression>,
    },
    Clear(Option<Expression>),
    Condition(BreakpointId, Option<Expression>),
    Continue,
    Delete(Option<BreakpointId>),
    Disassemble(Option<Expression>),
    Finish,
    Ignore(BreakpointId, Expression),
    Next,
    Out(Expression, Expression),
    Print(Expression),
    SetRegister(Register, Expression),
    SetMemory(Expression, Expression),
    Step,
}

impl Command {
    pub fn parse(input: &str) -> Result<Command, DebuggerError> {
        let lexemes = tokenize(input);
        let mut parser = Parser::new(&lexemes, input.len());

        let command = parse_command(&mut parser)?;
        parser.finish()?;

        Ok(command)
    }
}

fn parse_command(parser: &mut Parser) -> Result<Command, DebuggerError> {
    let position = parser.position();
    let keyword = match parser.peek() {
        Some(&Token::Keyword(keyword)) => keyword,
        _ => return Err(parser.unexpected("a command")),
    };
    parser.advance();

    let command = match keyword {
        Keyword::Base => Command::Base(parser.expression()?),
        Keyword::Break => parse_breakpoint(parser, BreakpointLife::Permanent)?,
        Keyword::Tbreak => parse_breakpoint(parser, BreakpointLife::Temporary)?,
        Keyword::Clear => Command::Clear(optional_expression(parser)?),
        Keyword::Condition => {
            let id = parse_id(parser)?;
            Command::Condition(id, optional_expression(parser)?)
        }
        Keyword::Continue => Command::Continue,
        Keyword::Delete => {
            if parser.at_end() {
                Command::Delete(None)
            } else {
                Command::Delete(Some(parse_id(parser)?))
            }
        }
        Keyword::Disassemble => Command::Disassemble(optional_expression(parser)?),
        Keyword::Finish => Command::Finish,
        Keyword::Ignore => {
            let id = parse_id(parser)?;
            Command::Ignore(id, parser.expression()?)
        }
        Keyword::Next => Command::Next,
        Keyword::Out => {
            let port = parser.expression()?;
            Command::Out(port, parser.expression()?)
        }
        Keyword::Print => Command::Print(parser.expression()?),
        Keyword::Set => parse_set(parser)?,
        Keyword::Step => Command::Step,
        Keyword::If
        | Keyword::Page
        | Keyword::Port
        | Keyword::Read
        | Keyword::Time
        | Keyword::Write => {
            return Err(
                ParseError::new(position, format!("'{}' is not a command", keyword.name())).into(),
            )
        }
    };

    Ok(command)
}

fn parse_breakpoint(parser: &mut Parser, life: BreakpointLife) -> Result<Command, DebuggerError> {
    let target = if parser.accept_keyword(Keyword::Port) {
        let write = if parser.accept_keyword(Keyword::Read) {
            false
        } else if parser.accept_keyword(Keyword::Write) {
            true
        } else {
            return Err(parser.unexpected("'read' or 'write'"));
        };

        BreakpointTarget::Port {
            write,
            port: parser.expression()?,
        }
    } else if parser.accept_keyword(Keyword::Time) {
        BreakpointTarget::Time(parser.expression()?)
    } else {
        let kind = if parser.accept_keyword(Keyword::Read) {
            BreakpointKind::MemoryRead
        } else if parser.accept_keyword(Keyword::Write) {
            BreakpointKind::MemoryWrite
        } else {
            BreakpointKind::Execute
        };

        let (page, start) = if parser.accept_keyword(Keyword::Page) {
            let page = parser.expression()?;
            // "page 5:0xc000" and "page 5 0xc000" are both accepted
            if parser.peek() == Some(&Token::Colon) {
                parser.advance();
            }
            (Some(page), Some(parser.expression()?))
        } else if parser.at_end() || parser.peek_keyword(Keyword::If) {
            (None, None)
        } else {
            (None, Some(parser.expression()?))
        };

        let end = if start.is_some() && parser.peek() == Some(&Token::Comma) {
            let position = parser.position();
            if page.is_some() {
                return Err(ParseError::new(position, "a page cannot be given for a range").into());
            }
            parser.advance();
            Some(parser.expression()?)
        } else {
            None
        };

        BreakpointTarget::Address {
            kind,
            page,
            start,
            end,
        }
    };

    let condition = if parser.accept_keyword(Keyword::If) {
        Some(parser.expression()?)
    } else {
        None
    };

    Ok(Command::Breakpoint {
        life,
        target,
        condition,
    })
}

fn parse_set(parser: &mut Parser) -> Result<Command, DebuggerError> {
    let register = match parser.peek() {
        Some(&Token::Register(register)) => Some(register),
        Some(Token::Keyword(Keyword::Time)) => Some(Register::Tstates),
        _ => None,
    };
    if let Some(register) = register {
        parser.advance();
        return Ok(Command::SetRegister(register, parser.expression()?));
    }

    let address = parser.expression()?;
    Ok(Command::SetMemory(address, parser.expression()?))
}

fn parse_id(parser: &mut Parser) -> Result<BreakpointId, DebuggerError> {
    match parser.peek() {
        Some(&Token::Number(id)) => {
            parser.advance();
            Ok(BreakpointId(id))
        }
        _ => Err(parser.unexpected("a breakpoint id")),
    }
}

fn optional_expression(parser: &mut Parser) -> Result<Option<Expression>, DebuggerError> {
    if parser.at_end() {
        Ok(None)
    } else {
        parser.expression().map(Some)
    }
}
