use crate::debugger::expression::{BinaryOperator, Expression, UnaryOperator};
use crate::debugger::lexer::{tokenize, Keyword, Lexeme, Token};
use crate::errors::{DebuggerError, LexError, ParseError};
use crate::machine::Register;

/// Binding strength of the expression operators, loosest first.
///
/// Equality sits *above* comparison and unary negation sits *below*
/// multiplication. Existing debugger scripts depend on this ordering, so it is
/// kept exactly rather than matched to C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    LogicalOr = 1,
    LogicalAnd = 2,
    Comparison = 3,
    Equality = 4,
    Negate = 5,
    TimesDivide = 6,
    PlusMinus = 7,
}

pub const BINARY_PRECEDENCE: [(BinaryOperator, Precedence); 12] = [
    (BinaryOperator::LogicalOr, Precedence::LogicalOr),
    (BinaryOperator::LogicalAnd, Precedence::LogicalAnd),
    (BinaryOperator::Less, Precedence::Comparison),
    (BinaryOperator::Greater, Precedence::Comparison),
    (BinaryOperator::LessEqual, Precedence::Comparison),
    (BinaryOperator::GreaterEqual, Precedence::Comparison),
    (BinaryOperator::Equal, Precedence::Equality),
    (BinaryOperator::NotEqual, Precedence::Equality),
    (BinaryOperator::Multiply, Precedence::TimesDivide),
    (BinaryOperator::Divide, Precedence::TimesDivide),
    (BinaryOperator::Add, Precedence::PlusMinus),
    (BinaryOperator::Subtract, Precedence::PlusMinus),
];

pub const UNARY_PRECEDENCE: Precedence = Precedence::Negate;

/// Deepest expression tree a command may build. Bounds the recursion of
/// parsing, evaluation and printing.
pub const MAX_NESTING: usize = 256;

impl Precedence {
    #[inline]
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl BinaryOperator {
    pub fn precedence(self) -> Precedence {
        BINARY_PRECEDENCE
            .iter()
            .find(|&&(operator, _)| operator == self)
            .map(|&(_, precedence)| precedence)
            .unwrap_or(Precedence::PlusMinus)
    }
}

fn binary_operator(token: &Token) -> Option<BinaryOperator> {
    match *token {
        Token::LogicalOr => Some(BinaryOperator::LogicalOr),
        Token::LogicalAnd => Some(BinaryOperator::LogicalAnd),
        Token::Comparison(operator) | Token::Equality(operator) | Token::TimesDivide(operator) => {
            Some(operator)
        }
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        _ => None,
    }
}

fn unary_operator(token: &Token) -> Option<UnaryOperator> {
    match *token {
        Token::Negate => Some(UnaryOperator::Not),
        Token::Minus => Some(UnaryOperator::Negate),
        Token::Plus => Some(UnaryOperator::Plus),
        _ => None,
    }
}

/// Cursor over a tokenized command. The command grammar drives it directly
/// and calls [`Parser::expression`] wherever an expression is expected.
pub struct Parser<'a> {
    lexemes: &'a [Lexeme],
    index: usize,
    input_len: usize,
    // Brackets and unary operators currently open
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(lexemes: &'a [Lexeme], input_len: usize) -> Parser<'a> {
        Parser {
            lexemes,
            index: 0,
            input_len,
            depth: 0,
        }
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.lexemes.get(self.index).map(|lexeme| &lexeme.token)
    }

    pub fn peek_keyword(&self, keyword: Keyword) -> bool {
        self.peek() == Some(&Token::Keyword(keyword))
    }

    pub fn advance(&mut self) -> Option<&'a Token> {
        let token = self.peek();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    /// Byte offset of the next token, or the end of the input.
    pub fn position(&self) -> usize {
        self.lexemes
            .get(self.index)
            .map(|lexeme| lexeme.position)
            .unwrap_or(self.input_len)
    }

    pub fn at_end(&self) -> bool {
        self.index >= self.lexemes.len()
    }

    /// Consumes `keyword` if it is next.
    pub fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.index += 1;
        }
        found
    }

    pub fn expect(&mut self, expected: &Token, what: &str) -> Result<(), DebuggerError> {
        if self.peek() == Some(expected) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Error for whatever token is next, naming what was wanted instead.
    pub fn unexpected(&self, what: &str) -> DebuggerError {
        let position = self.position();
        match self.peek() {
            Some(Token::Error(text)) => LexError {
                position,
                text: text.clone(),
            }
            .into(),
            Some(token) => ParseError::new(position, format!("expected {}, found {}", what, token)).into(),
            None => ParseError::new(position, format!("expected {}, found end of input", what)).into(),
        }
    }

    /// Fails if any tokens are left over.
    pub fn finish(&self) -> Result<(), DebuggerError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of command"))
        }
    }

    pub fn expression(&mut self) -> Result<Expression, DebuggerError> {
        let (expression, _) = self.climb(Precedence::LogicalOr.level())?;
        Ok(expression)
    }

    fn too_deep(&self, position: usize) -> DebuggerError {
        ParseError::new(position, "expression nested too deeply").into()
    }

    fn enter(&mut self) -> Result<(), DebuggerError> {
        if self.depth >= MAX_NESTING {
            return Err(self.too_deep(self.position()));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // Height of a new node whose tallest child is `child_height`
    fn node_height(&self, position: usize, child_height: usize) -> Result<usize, DebuggerError> {
        if child_height >= MAX_NESTING {
            Err(self.too_deep(position))
        } else {
            Ok(child_height + 1)
        }
    }

    // Each step returns the expression with the height of its tree
    fn climb(&mut self, min_level: u8) -> Result<(Expression, usize), DebuggerError> {
        let (mut lhs, mut height) = self.unary()?;

        while let Some(operator) = self.peek().and_then(binary_operator) {
            let level = operator.precedence().level();
            if level < min_level {
                break;
            }
            let position = self.position();
            self.index += 1;

            // All binary operators are left-associative
            let (rhs, rhs_height) = self.climb(level + 1)?;
            height = self.node_height(position, height.max(rhs_height))?;
            lhs = Expression::binary(operator, lhs, rhs);
        }

        Ok((lhs, height))
    }

    fn unary(&mut self) -> Result<(Expression, usize), DebuggerError> {
        match self.peek().and_then(unary_operator) {
            Some(operator) => {
                let position = self.position();
                self.enter()?;
                self.index += 1;
                let (operand, height) = self.climb(UNARY_PRECEDENCE.level())?;
                self.leave();

                let height = self.node_height(position, height)?;
                Ok((Expression::unary(operator, operand), height))
            }
            None => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<(Expression, usize), DebuggerError> {
        let position = self.position();
        let expression = match self.peek() {
            Some(&Token::Number(value)) => Expression::Number(value),
            Some(&Token::Register(register)) => Expression::Register(register),
            Some(Token::Keyword(Keyword::Time)) => Expression::Register(Register::Tstates),
            Some(Token::LeftParen) => {
                self.enter()?;
                self.index += 1;
                let inner = self.climb(Precedence::LogicalOr.level())?;
                self.expect(&Token::RightParen, "')'")?;
                self.leave();
                return Ok(inner);
            }
            Some(Token::LeftBracket) => {
                self.enter()?;
                self.index += 1;
                let (address, height) = self.climb(Precedence::LogicalOr.level())?;
                self.expect(&Token::RightBracket, "']'")?;
                self.leave();
                let height = self.node_height(position, height)?;
                return Ok((Expression::MemoryRead(Box::new(address)), height));
            }
            Some(Token::Keyword(Keyword::Port)) => {
                self.enter()?;
                self.index += 1;
                self.expect(&Token::LeftBracket, "'['")?;
                let (port, height) = self.climb(Precedence::LogicalOr.level())?;
                self.expect(&Token::RightBracket, "']'")?;
                self.leave();
                let height = self.node_height(position, height)?;
                return Ok((Expression::PortRead(Box::new(port)), height));
            }
            _ => return Err(self.unexpected("an expression")),
        };

        self.index += 1;
        Ok((expression, 1))
    }
}

/// Parses a complete expression; trailing tokens are an error.
pub fn parse_expression(input: &str) -> Result<Expression, DebuggerError> {
    let lexemes = tokenize(input);
    let mut parser = Parser::new(&lexemes, input.len());

    let expression = parser.expression()?;
    parser.finish()?;

    Ok(expression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::expression::BinaryOperator::*;
    use crate::machine::FlatMachine;

    fn parse(input: &str) -> Expression {
        parse_expression(input).unwrap()
    }

    fn evaluate(input: &str) -> u32 {
        parse(input).evaluate(&mut FlatMachine::new()).unwrap()
    }

    #[test]
    fn precedence_table_is_loosest_first() {
        let order = [
            Precedence::LogicalOr,
            Precedence::LogicalAnd,
            Precedence::Comparison,
            Precedence::Equality,
            Precedence::Negate,
            Precedence::TimesDivide,
            Precedence::PlusMinus,
        ];

        for pair in order.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should bind looser than {:?}", pair[0], pair[1]);
        }
        assert_eq!(UNARY_PRECEDENCE, Precedence::Negate);
    }

    #[test]
    fn every_binary_operator_has_a_precedence() {
        let operators = [
            LogicalOr, LogicalAnd, Less, Greater, LessEqual, GreaterEqual, Equal, NotEqual, Add,
            Subtract, Multiply, Divide,
        ];

        for operator in operators {
            let entries = BINARY_PRECEDENCE
                .iter()
                .filter(|(candidate, _)| *candidate == operator)
                .count();
            assert_eq!(entries, 1, "{:?}", operator);
        }
    }

    #[test]
    fn equality_groups_before_logical_and() {
        assert_eq!(parse("a == b && c"), parse("(a == b) && c"));
    }

    #[test]
    fn negation_groups_before_equality() {
        assert_eq!(parse("!a == b"), parse("(!a) == b"));
        assert_eq!(parse("-a * b"), parse("-(a * b)"));
    }

    #[test]
    fn documented_precedence_results() {
        assert_eq!(evaluate("1 == 1 && 0"), 0);
        assert_eq!(evaluate("0 || 1 && 0"), 0);
        assert_eq!(evaluate("1 == 2 == 0"), 1);
        // equality binds tighter than comparison: 2 < (1 == 0)
        assert_eq!(evaluate("2 < 1 == 0"), 0);
        // addition binds tighter than multiplication: 2 * (3 + 4)
        assert_eq!(evaluate("2 * 3 + 4"), 14);
    }

    // One row per (looser, tighter) pair of levels. Each value differs from
    // what the other grouping would give.
    #[test]
    fn every_level_pair_evaluates_by_table() {
        use super::Precedence::{
            Comparison, Equality, LogicalAnd, LogicalOr, Negate, PlusMinus, TimesDivide,
        };

        let cases: [(Precedence, Precedence, &str, u32); 24] = [
            (LogicalOr, LogicalAnd, "1 || 0 && 0", 1),
            (LogicalOr, Comparison, "1 || 0 < 0", 1),
            (LogicalOr, Equality, "1 || 2 == 2", 1),
            (LogicalOr, Negate, "!1 || 1", 1),
            (LogicalOr, TimesDivide, "1 || 0 * 0", 1),
            (LogicalOr, TimesDivide, "2 / 1 || 0", 1),
            (LogicalOr, PlusMinus, "1 || 0 - 1", 1),
            (LogicalAnd, Comparison, "2 > 1 && 0", 0),
            (LogicalAnd, Equality, "2 == 2 && 3", 1),
            (LogicalAnd, Negate, "!0 && 0", 0),
            (LogicalAnd, TimesDivide, "2 * 1 && 1", 1),
            (LogicalAnd, PlusMinus, "1 && 0 - 1", 1),
            (Comparison, Equality, "2 < 1 == 0", 0),
            (Comparison, Negate, "-2 > 1", 1),
            (Comparison, TimesDivide, "2 * 0 < 1", 1),
            (Comparison, PlusMinus, "1 < 2 + 3", 1),
            (Equality, Negate, "!0 == 2", 0),
            (Equality, TimesDivide, "4 == 2 * 2", 1),
            (Equality, PlusMinus, "3 == 1 + 2", 1),
            (Negate, TimesDivide, "!0 * 2", 1),
            (Negate, TimesDivide, "-4 / 2", 0xFFFF_FFFE),
            (Negate, PlusMinus, "!0 + 1", 0),
            (TimesDivide, PlusMinus, "2 * 3 + 4", 14),
            (TimesDivide, PlusMinus, "8 / 2 + 2", 2),
        ];

        for (looser, tighter, input, expected) in cases {
            assert!(looser < tighter, "{}", input);
            assert_eq!(evaluate(input), expected, "{:?} vs {:?}: {}", looser, tighter, input);
        }

        let levels = [LogicalOr, LogicalAnd, Comparison, Equality, Negate, TimesDivide, PlusMinus];
        for (index, &looser) in levels.iter().enumerate() {
            for &tighter in &levels[index + 1..] {
                assert!(
                    cases.iter().any(|&(l, t, _, _)| l == looser && t == tighter),
                    "no row for {:?} vs {:?}",
                    looser,
                    tighter
                );
            }
        }
    }

    #[test]
    fn same_level_operators_group_left() {
        let cases = [
            ("1 - 1 - 1", 0xFFFF_FFFF),
            ("8 / 4 / 2", 1),
            ("1 == 2 == 0", 1),
            ("3 > 2 > 1", 0),
            ("1 || 0 || 0", 1),
        ];

        for (input, expected) in cases {
            assert_eq!(evaluate(input), expected, "{}", input);
        }
    }

    #[test]
    fn atoms() {
        assert_eq!(
            parse("[hl + 1]"),
            Expression::MemoryRead(Box::new(Expression::binary(
                Add,
                Expression::Register(Register::Hl),
                Expression::Number(1)
            )))
        );
        assert_eq!(
            parse("port[$fe]"),
            Expression::PortRead(Box::new(Expression::Number(0xFE)))
        );
        assert_eq!(parse("time"), Expression::Register(Register::Tstates));
        assert_eq!(parse("tstates"), Expression::Register(Register::Tstates));
    }

    #[test]
    fn display_round_trips() {
        let inputs = [
            "a == 5",
            "!a == b || [hl] != port[0xfe] && -c",
            "2 * 3 + 4 / -(1 - 1)",
            "sp >= 0xff00 && time < 70000",
            "+a",
            "--1",
        ];

        for input in inputs {
            let expression = parse(input);
            assert_eq!(parse(&expression.to_string()), expression, "{}", input);
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = "a + b * c == d && [ix] || !e";
        assert_eq!(parse(input), parse(input));
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let too_deep = [
            "(".repeat(100_000),
            format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000)),
            format!("{}1", "!".repeat(100_000)),
            format!("{}1", "-(".repeat(50_000)),
            format!("{}0", "[".repeat(100_000)),
            format!("1{}", " + 1".repeat(100_000)),
        ];

        for input in &too_deep {
            match parse_expression(input) {
                Err(DebuggerError::Parse(error)) => {
                    assert_eq!(error.message, "expression nested too deeply")
                }
                other => panic!("expected a nesting error, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn nesting_within_the_limit_is_accepted() {
        let brackets = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&brackets), 1);

        let chain = format!("1{}", " + 1".repeat(MAX_NESTING - 1));
        assert_eq!(evaluate(&chain), MAX_NESTING as u32);
        assert!(parse_expression(&format!("{} + 1", chain)).is_err());
    }

    #[test]
    fn limit_error_points_at_the_first_bracket_too_many() {
        let input = "(".repeat(MAX_NESTING + 1);
        assert_eq!(
            parse_expression(&input),
            Err(ParseError::new(MAX_NESTING, "expression nested too deeply").into())
        );
    }

    #[test]
    fn unbalanced_parenthesis_reports_end_of_input() {
        assert_eq!(
            parse_expression("(a + 1"),
            Err(ParseError::new(6, "expected ')', found end of input").into())
        );
    }

    #[test]
    fn dangling_operator() {
        assert_eq!(
            parse_expression("a +"),
            Err(ParseError::new(3, "expected an expression, found end of input").into())
        );
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert_eq!(
            parse_expression("1 2"),
            Err(ParseError::new(2, "expected end of command, found number 2").into())
        );
    }

    #[test]
    fn lexical_errors_carry_their_position() {
        assert_eq!(
            parse_expression("a == @"),
            Err(LexError {
                position: 5,
                text: "@".to_string()
            }
            .into())
        );
    }
}
