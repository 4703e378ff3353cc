//! Parser for contract clause expressions.
//!
//! Clauses live in comments, outside the syntax tree, so they are tokenized
//! and parsed here with Python's expression precedence. Lambdas, sets,
//! starred items and f-strings are rejected.

use super::ast::{BinOp, BoolOp, CmpOp, Comprehension, Expr, Literal, Target, UnaryOp};
use super::lower::decode_escapes;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    End,
}

const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "<<", ">>", "(", ")", "[", "]", "{", "}", ",", ":", ".",
    "+", "-", "*", "/", "%", "<", ">", "&", "|", "^", "~", "=",
];

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let (token, next) = number(&chars, i)?;
            tokens.push(token);
            i = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if matches!(chars.get(i), Some('\'' | '"')) && word.len() <= 2 {
                let prefix = word.to_ascii_lowercase();
                if prefix.chars().all(|p| matches!(p, 'r' | 'u')) {
                    let (text, next) = string(&chars, i, prefix.contains('r'))?;
                    tokens.push(Token::Str(text));
                    i = next;
                    continue;
                }
                return Err(format!("unsupported string prefix '{word}'"));
            }
            tokens.push(Token::Name(word));
            continue;
        }
        if c == '\'' || c == '"' {
            let (text, next) = string(&chars, i, false)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }
        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                tokens.push(Token::Op(*op));
                i += op.len();
            }
            None => return Err(format!("unexpected character '{c}'")),
        }
    }
    tokens.push(Token::End);
    Ok(tokens)
}

fn number(chars: &[char], start: usize) -> Result<(Token, usize), String> {
    let mut i = start;
    let radix_prefix = chars.get(i) == Some(&'0')
        && matches!(chars.get(i + 1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
    if radix_prefix {
        let radix = match chars[i + 1].to_ascii_lowercase() {
            'x' => 16,
            'o' => 8,
            _ => 2,
        };
        i += 2;
        let digits_start = i;
        while i < chars.len() && (chars[i].is_ascii_hexdigit() || chars[i] == '_') {
            i += 1;
        }
        let digits: String = chars[digits_start..i].iter().filter(|c| **c != '_').collect();
        let value = i64::from_str_radix(&digits, radix).map_err(|e| format!("bad literal: {e}"))?;
        return Ok((Token::Int(value), i));
    }

    let mut is_float = false;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        is_float = true;
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
            i += 1;
        }
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut j = i + 1;
        if matches!(chars.get(j), Some('+' | '-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(char::is_ascii_digit) {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    if matches!(chars.get(i), Some('j' | 'J')) {
        return Err("complex literals are not supported".into());
    }
    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let token = if is_float {
        Token::Float(text.parse().map_err(|e| format!("bad literal: {e}"))?)
    } else {
        Token::Int(text.parse().map_err(|e| format!("bad literal: {e}"))?)
    };
    Ok((token, i))
}

fn string(chars: &[char], start: usize, raw: bool) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut body = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            body.push(c);
            body.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == quote {
            let text = if raw { body } else { decode_escapes(&body) };
            return Ok((text, i + 1));
        }
        body.push(c);
        i += 1;
    }
    Err("unterminated string".into())
}

static END_TOKEN: Token = Token::End;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&END_TOKEN)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&END_TOKEN)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == word)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let hit = self.at_op(op);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let hit = self.at_keyword(word);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expect_op(&mut self, op: &str) -> Result<(), String> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(format!("expected '{op}', found {:?}", self.peek()))
        }
    }

    fn expression(&mut self) -> Result<Expr, String> {
        if self.at_keyword("lambda") {
            return Err("lambda is not supported in contracts".into());
        }
        let body = self.or_test()?;
        if self.eat_keyword("if") {
            let test = self.or_test()?;
            if !self.eat_keyword("else") {
                return Err("expected 'else' in conditional expression".into());
            }
            let orelse = self.expression()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn or_test(&mut self) -> Result<Expr, String> {
        let mut left = self.and_test()?;
        while self.eat_keyword("or") {
            let right = self.and_test()?;
            left = Expr::Bool(BoolOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, String> {
        let mut left = self.not_test()?;
        while self.eat_keyword("and") {
            let right = self.not_test()?;
            left = Expr::Bool(BoolOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, String> {
        if self.eat_keyword("not") {
            let operand = self.not_test()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Token::Op(op) => match *op {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::NotEq,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::LtE,
                ">" => CmpOp::Gt,
                ">=" => CmpOp::GtE,
                _ => return None,
            },
            Token::Name(word) if word == "in" => CmpOp::In,
            Token::Name(word) if word == "not" => {
                if !matches!(self.peek_at(1), Token::Name(next) if next == "in") {
                    return None;
                }
                self.pos += 1;
                CmpOp::NotIn
            }
            Token::Name(word) if word == "is" => {
                if matches!(self.peek_at(1), Token::Name(next) if next == "not") {
                    self.pos += 1;
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let first = self.bit_or()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.bit_or()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, String>,
    ) -> Result<Expr, String> {
        let mut left = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_op(symbol) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn bit_or(&mut self) -> Result<Expr, String> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Expr, String> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr, String> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> Result<Expr, String> {
        self.binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Self::arith)
    }

    fn arith(&mut self) -> Result<Expr, String> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr, String> {
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr, String> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else if self.eat_op("~") {
            UnaryOp::Invert
        } else {
            return self.power();
        };
        let operand = self.factor()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                match self.advance() {
                    Token::Name(attr) => expr = Expr::Attribute(Box::new(expr), attr),
                    other => return Err(format!("expected attribute name, found {other:?}")),
                }
            } else if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                self.expect_op("]")?;
                expr = Expr::Subscript(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn call(&mut self, func: Expr) -> Result<Expr, String> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err("argument unpacking is not supported".into());
            }
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Name(name), Token::Op("=")) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.pos += 2;
                kwargs.push((name, self.expression()?));
            } else {
                let arg = self.expression()?;
                if self.at_keyword("for") && args.is_empty() && kwargs.is_empty() {
                    let generators = self.comprehension_clauses()?;
                    args.push(Expr::ListComp {
                        element: Box::new(arg),
                        generators,
                    });
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> Result<Expr, String> {
        let lower = if self.at_op(":") {
            None
        } else {
            let first = self.expression()?;
            if !self.at_op(":") {
                if self.eat_op(",") {
                    let mut items = vec![first];
                    while !self.at_op("]") {
                        items.push(self.expression()?);
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                    return Ok(Expr::Tuple(items));
                }
                return Ok(first);
            }
            Some(Box::new(first))
        };
        self.expect_op(":")?;
        let upper = if self.at_op(":") || self.at_op("]") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let step = if self.eat_op(":") && !self.at_op("]") {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn target(&mut self) -> Result<Target, String> {
        let mut targets = Vec::new();
        loop {
            let target = if self.eat_op("(") {
                let inner = self.target()?;
                self.expect_op(")")?;
                inner
            } else {
                match self.advance() {
                    Token::Name(name) if !is_keyword(&name) => Target::Name(name),
                    other => return Err(format!("invalid comprehension target {other:?}")),
                }
            };
            targets.push(target);
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(if targets.len() == 1 {
            targets.remove(0)
        } else {
            Target::Sequence(targets)
        })
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, String> {
        let mut generators = Vec::new();
        while self.eat_keyword("for") {
            let target = self.target()?;
            if !self.eat_keyword("in") {
                return Err("expected 'in' in comprehension".into());
            }
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.eat_keyword("if") {
                conditions.push(self.or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Int(value) => Ok(Expr::int(value)),
            Token::Float(value) => Ok(Expr::Literal(Literal::Float(value))),
            Token::Str(mut text) => {
                while let Token::Str(more) = self.peek() {
                    text.push_str(more);
                    self.pos += 1;
                }
                Ok(Expr::str(&text))
            }
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Literal::Bool(true))),
                "False" => Ok(Expr::Literal(Literal::Bool(false))),
                "None" => Ok(Expr::Literal(Literal::None)),
                word if is_keyword(word) => Err(format!("unexpected keyword '{word}'")),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if self.at_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op(")")?;
                    return Ok(Expr::ListComp {
                        element: Box::new(first),
                        generators,
                    });
                }
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Token::Op("[") => {
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.at_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op("]")?;
                    return Ok(Expr::ListComp {
                        element: Box::new(first),
                        generators,
                    });
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                if self.eat_op("}") {
                    return Ok(Expr::Dict(Vec::new()));
                }
                let key = self.expression()?;
                if !self.eat_op(":") {
                    return Err("set literals are not supported".into());
                }
                let value = self.expression()?;
                if self.at_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op("}")?;
                    return Ok(Expr::DictComp {
                        key: Box::new(key),
                        value: Box::new(value),
                        generators,
                    });
                }
                let mut pairs = vec![(key, value)];
                while self.eat_op(",") {
                    if self.at_op("}") {
                        break;
                    }
                    let key = self.expression()?;
                    self.expect_op(":")?;
                    pairs.push((key, self.expression()?));
                }
                self.expect_op("}")?;
                Ok(Expr::Dict(pairs))
            }
            Token::End => Err("unexpected end of expression".into()),
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "and" | "or" | "not" | "in" | "is" | "if" | "else" | "for" | "lambda" | "def" | "return"
            | "class" | "import" | "from" | "yield" | "await" | "with" | "as" | "while" | "del"
    )
}

/// Parse one contract clause into an expression.
pub fn parse_expression(source: &str) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    match parser.peek() {
        Token::End => Ok(expr),
        other => Err(format!("unexpected trailing {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        parse_expression(source).unwrap_or_else(|e| panic!("{source}: {e}"))
    }

    #[test]
    fn precedence_matches_python() {
        assert_eq!(
            parse("1 + 2 * 3"),
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::int(1)),
                Box::new(Expr::Binary(BinOp::Mul, Box::new(Expr::int(2)), Box::new(Expr::int(3))))
            )
        );
        assert_eq!(
            parse("-2 ** 2"),
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Binary(BinOp::Pow, Box::new(Expr::int(2)), Box::new(Expr::int(2))))
            )
        );
        assert!(matches!(parse("not a and b"), Expr::Bool(BoolOp::And, _, _)));
    }

    #[test]
    fn chained_and_word_comparisons() {
        match parse("0 <= x < 10") {
            Expr::Compare(_, rest) => {
                assert_eq!(rest.iter().map(|(op, _)| *op).collect::<Vec<_>>(), vec![CmpOp::LtE, CmpOp::Lt]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse("k not in d and v is not None") {
            Expr::Bool(BoolOp::And, left, right) => {
                assert!(matches!(*left, Expr::Compare(_, ref r) if r[0].0 == CmpOp::NotIn));
                assert!(matches!(*right, Expr::Compare(_, ref r) if r[0].0 == CmpOp::IsNot));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn postfix_forms() {
        assert!(matches!(parse("self.items[-1]"), Expr::Subscript(_, _)));
        assert!(matches!(parse("xs[1:]"), Expr::Subscript(_, ref idx) if matches!(**idx, Expr::Slice { .. })));
        assert!(matches!(parse("len(result)"), Expr::Call { ref args, .. } if args.len() == 1));
        assert!(matches!(parse("round(x, ndigits=2)"), Expr::Call { ref kwargs, .. } if kwargs[0].0 == "ndigits"));
    }

    #[test]
    fn comprehensions_and_generators() {
        assert!(matches!(parse("[x * 2 for x in xs if x > 0]"), Expr::ListComp { .. }));
        assert!(matches!(parse("all(v >= 0 for v in result)"), Expr::Call { ref args, .. } if matches!(args[0], Expr::ListComp { .. })));
        assert!(matches!(parse("{k: v for k, v in pairs}"), Expr::DictComp { .. }));
    }

    #[test]
    fn literals_and_ternary() {
        assert_eq!(parse("'a' 'b'"), Expr::str("ab"));
        assert_eq!(parse("0x1F"), Expr::int(31));
        assert_eq!(parse("1e3"), Expr::Literal(Literal::Float(1000.0)));
        assert!(matches!(parse("a if c else b"), Expr::IfExp { .. }));
        assert_eq!(parse("(1,)"), Expr::Tuple(vec![Expr::int(1)]));
    }

    #[test]
    fn rejects_non_expressions() {
        assert!(parse_expression("x = 1").is_err());
        assert!(parse_expression("lambda x: x").is_err());
        assert!(parse_expression("{1, 2}").is_err());
        assert!(parse_expression("a +").is_err());
        assert!(parse_expression("f'{x}'").is_err());
        assert!(parse_expression("result >").is_err());
    }
}
