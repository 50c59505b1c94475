//! Demonstration tools shipped with the default tool executor.

use crate::capability::tool::{Tool, ToolError, ToolSpec, ToolType};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

fn input_text<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("'{}' must be a string", key)))
}

/// Returns its `input` unchanged.
pub struct Echo {
    spec: ToolSpec,
}

impl Echo {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new("echo", ToolType::Text, "Return the input text unchanged")
                .with_keywords(&["echo", "repeat"])
                .with_required(&["input"]),
        }
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for Echo {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let input = params
            .get("input")
            .cloned()
            .unwrap_or(Value::Null);
        Ok(json!({ "content": input }))
    }
}

/// Counts words, characters and lines of `input`.
pub struct WordCount {
    spec: ToolSpec,
}

impl WordCount {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new("word_count", ToolType::Text, "Count words, characters and lines")
                .with_keywords(&["word count", "count words", "count the words"])
                .with_required(&["input"]),
        }
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WordCount {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let text = input_text(params, "input")?;
        Ok(json!({
            "words": text.split_whitespace().count(),
            "characters": text.chars().count(),
            "lines": text.lines().count(),
        }))
    }
}

/// Evaluates an arithmetic `expression`.
///
/// Supports `+ - * / % ^`, parentheses, unary minus and decimal literals.
pub struct Calculator {
    spec: ToolSpec,
}

impl Calculator {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new("calculator", ToolType::Calculation, "Evaluate arithmetic expressions")
                .with_keywords(&["calculate", "compute", "math"])
                .with_required(&["expression"]),
        }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for Calculator {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let expression = match params.get("expression") {
            Some(Value::Number(n)) => n.to_string(),
            _ => input_text(params, "expression")?.to_string(),
        };
        let result = evaluate(&expression).map_err(ToolError::InvalidInput)?;
        Ok(json!({ "expression": expression, "result": result }))
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected token '{}'", token));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{}", n),
            Token::Op(c) => write!(f, "{}", c),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", literal))?;
                tokens.push(Token::Num(value));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

/// Deepest nesting of parentheses, signs, and exponents the parser accepts.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run a recursive production one level deeper, bounded by [`MAX_DEPTH`].
    fn nested(&mut self, production: fn(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = production(self);
        self.depth -= 1;
        value
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.next();
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := power (('*' | '/' | '%') power)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.power()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.next();
            let rhs = self.power()?;
            if op != '*' && rhs == 0.0 {
                return Err("division by zero".to_string());
            }
            value = match op {
                '*' => value * rhs,
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // power := unary ('^' power)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            let exponent = self.nested(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.next();
                Ok(-self.nested(Self::unary)?)
            }
            Some(Token::Op('+')) => {
                self.next();
                self.nested(Self::unary)
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.nested(Self::expr)?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected token '{}'", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-3 + 5").unwrap(), 2.0);
        assert_eq!(evaluate("7 % 4").unwrap(), 3.0);
        assert_eq!(evaluate("1.5 * 2").unwrap(), 3.0);
    }

    #[test]
    fn test_evaluate_errors() {
        assert_eq!(evaluate("1 / 0").unwrap_err(), "division by zero");
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").unwrap_err().contains("parenthesis"));
        assert!(evaluate("import os").unwrap_err().contains("unexpected character"));
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn test_evaluate_rejects_deep_nesting() {
        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(evaluate(&deep).unwrap_err(), "expression nested too deeply");
        assert!(evaluate(&"-".repeat(100_000)).unwrap_err().contains("too deeply"));
        assert!(evaluate(&"2^".repeat(100_000)).unwrap_err().contains("too deeply"));

        let shallow = format!("{}1{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_calculator_tool() {
        let calc = Calculator::new();
        let mut params = Map::new();
        params.insert("expression".into(), json!("10 + 20"));
        let out = calc.call(&params).await.unwrap();
        assert_eq!(out["result"], 30.0);
        assert_eq!(out["expression"], "10 + 20");

        params.insert("expression".into(), json!("5 / 0"));
        let err = calc.call(&params).await.unwrap_err();
        assert_eq!(err, ToolError::InvalidInput("division by zero".into()));

        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        params.insert("expression".into(), json!(nested));
        let err = calc.call(&params).await.unwrap_err();
        assert_eq!(err, ToolError::InvalidInput("expression nested too deeply".into()));
    }

    #[tokio::test]
    async fn test_word_count_tool() {
        let tool = WordCount::new();
        let mut params = Map::new();
        params.insert("input".into(), json!("one two\nthree"));
        let out = tool.call(&params).await.unwrap();
        assert_eq!(out["words"], 3);
        assert_eq!(out["lines"], 2);

        params.insert("input".into(), json!(42));
        assert!(tool.call(&params).await.is_err());
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let mut params = Map::new();
        params.insert("input".into(), json!("hello"));
        let out = Echo::new().call(&params).await.unwrap();
        assert_eq!(out["content"], "hello");
    }
}
