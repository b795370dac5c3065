//! 递归下降语法分析
//!
//! ```text
//! unit      := item*
//! item      := '@' IDENT STRING            (directive)
//!            | ('@' IDENT)* 'fn' IDENT '(' params ')' block
//!            | 'var' IDENT '=' expr
//! stmt      := let | set | log | emit | fail | return | if | call
//! expr      := or ; or := and ('||' and)* ; and := cmp ('&&' cmp)* ...
//! ```

use super::ast::*;
use super::lexer::{tokenize, LexError, Token, TokenKind};
use crate::plugin::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            line: e.line,
            column: e.column,
            message: e.message,
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// 语法树嵌套上限：括号、运算符链、一元运算与语句块都计入
pub const MAX_NESTING: usize = 96;

pub fn parse(source: &str) -> PResult<SourceUnit> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.unit()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize 保证末尾有 Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn nth_kind(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn span(&self) -> Span {
        let t = self.peek();
        Span {
            line: t.line,
            column: t.column,
        }
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        let t = self.peek();
        Err(ParseError {
            line: t.line,
            column: t.column,
            message: message.into(),
        })
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return self.error(format!("nesting deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// 运算符链每多一项，左侧子树就深一层；链结束后恢复到 `outer`
    fn deepen(&mut self, outer: usize) -> PResult<()> {
        if self.depth >= MAX_NESTING {
            self.depth = outer;
            return self.error(format!("nesting deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let found = self.peek_kind().describe();
            self.error(format!(
                "expected {} {}, found {}",
                kind.describe(),
                context,
                found
            ))
        }
    }

    fn ident(&mut self, context: &str) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => self.error(format!(
                "expected identifier {}, found {}",
                context,
                other.describe()
            )),
        }
    }

    fn unit(&mut self) -> PResult<SourceUnit> {
        let mut items = Vec::new();
        let mut annotations = Vec::new();

        loop {
            let span = self.span();
            match self.peek_kind() {
                TokenKind::Eof => {
                    if !annotations.is_empty() {
                        return self.error("annotation must be followed by a function");
                    }
                    break;
                }
                TokenKind::At => {
                    self.advance();
                    let name = self.ident("after '@'")?;
                    if let TokenKind::Str(value) = self.peek_kind().clone() {
                        if !annotations.is_empty() {
                            return self.error("directive cannot follow an annotation");
                        }
                        self.advance();
                        items.push(Item::Directive { name, value, span });
                    } else {
                        annotations.push(Annotation { name, span });
                    }
                }
                TokenKind::Fn => {
                    let mut decl = self.function()?;
                    decl.annotations = std::mem::take(&mut annotations);
                    items.push(Item::Function(decl));
                }
                TokenKind::Var => {
                    if !annotations.is_empty() {
                        return self.error("annotations are only allowed on functions");
                    }
                    self.advance();
                    let name = self.ident("after 'var'")?;
                    self.expect(TokenKind::Assign, "in var declaration")?;
                    let init = self.expr()?;
                    items.push(Item::Global { name, init, span });
                }
                other => {
                    let found = other.describe();
                    return self.error(format!(
                        "expected 'fn', 'var' or '@' at top level, found {}",
                        found
                    ));
                }
            }
        }

        Ok(SourceUnit { items })
    }

    fn function(&mut self) -> PResult<FunctionDecl> {
        let span = self.span();
        self.expect(TokenKind::Fn, "")?;
        let name = self.ident("after 'fn'")?;
        self.expect(TokenKind::LParen, "after function name")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let pspan = self.span();
                let pname = self.ident("for parameter name")?;
                self.expect(TokenKind::Colon, "after parameter name")?;
                let type_name = self.ident("for parameter type")?;
                params.push(Param {
                    name: pname,
                    type_name,
                    span: pspan,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "to close parameter list")?;
        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            params,
            body,
            annotations: Vec::new(),
            span,
        })
    }

    fn block(&mut self) -> PResult<Block> {
        self.nested(Self::block_body)
    }

    fn block_body(&mut self) -> PResult<Block> {
        self.expect(TokenKind::LBrace, "to open block")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return self.error("unclosed block, expected '}'");
            }
            stmts.push(self.stmt()?);
        }
        self.advance();
        Ok(stmts)
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Let | TokenKind::Set => {
                let is_let = self.check(&TokenKind::Let);
                self.advance();
                let name = self.ident("for variable name")?;
                self.expect(TokenKind::Assign, "in assignment")?;
                let value = self.expr()?;
                if is_let {
                    StmtKind::Let { name, value }
                } else {
                    StmtKind::Set { name, value }
                }
            }
            TokenKind::Log => {
                self.advance();
                StmtKind::Log(self.expr()?)
            }
            TokenKind::Emit => {
                self.advance();
                StmtKind::Emit(self.expr()?)
            }
            TokenKind::Fail => {
                self.advance();
                StmtKind::Fail(self.expr()?)
            }
            TokenKind::Return => {
                let line = self.advance().line;
                // 同一行上的表达式才属于 return
                let value = if self.peek().line == line && self.starts_expr() {
                    Some(self.expr()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            TokenKind::If => self.if_stmt()?,
            TokenKind::Ident(_) if self.nth_kind(1) == &TokenKind::LParen => {
                let expr = self.expr()?;
                StmtKind::Expr(expr)
            }
            other => {
                return self.error(format!("expected statement, found {}", other.describe()));
            }
        };
        Ok(Stmt { kind, span })
    }

    fn if_stmt(&mut self) -> PResult<StmtKind> {
        self.expect(TokenKind::If, "")?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let span = self.span();
                let nested = self.nested(Self::if_stmt)?;
                Some(vec![Stmt { kind: nested, span }])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    fn starts_expr(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::Minus
                | TokenKind::Bang
        )
    }

    fn expr(&mut self) -> PResult<Expr> {
        self.nested(|p| p.binary(0))
    }

    /// 优先级爬升；level 越大绑定越紧
    fn binary(&mut self, level: usize) -> PResult<Expr> {
        const LEVELS: usize = 5;
        if level == LEVELS {
            return self.factor();
        }
        let mut lhs = self.binary(level + 1)?;
        let outer = self.depth;
        loop {
            let op = match (level, self.peek_kind()) {
                (0, TokenKind::OrOr) => BinaryOp::Or,
                (1, TokenKind::AndAnd) => BinaryOp::And,
                (2, TokenKind::Eq) => BinaryOp::Eq,
                (2, TokenKind::Ne) => BinaryOp::Ne,
                (3, TokenKind::Lt) => BinaryOp::Lt,
                (3, TokenKind::Le) => BinaryOp::Le,
                (3, TokenKind::Gt) => BinaryOp::Gt,
                (3, TokenKind::Ge) => BinaryOp::Ge,
                (4, TokenKind::Plus) => BinaryOp::Add,
                (4, TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let span = self.span();
            self.deepen(outer)?;
            self.advance();
            let rhs = self.binary(level + 1)?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        self.depth = outer;
        Ok(lhs)
    }

    /// 乘除层
    fn factor(&mut self) -> PResult<Expr> {
        let mut lhs = self.prefix()?;
        let outer = self.depth;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            let span = self.span();
            self.deepen(outer)?;
            self.advance();
            let rhs = self.prefix()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        self.depth = outer;
        Ok(lhs)
    }

    fn prefix(&mut self) -> PResult<Expr> {
        let span = self.span();
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.advance();
        let expr = self.nested(Self::prefix)?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            span,
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let span = self.span();
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                ExprKind::Literal(Value::Int(n))
            }
            TokenKind::Float(x) => {
                self.advance();
                ExprKind::Literal(Value::Float(x))
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Literal(Value::Str(s))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Value::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Value::Bool(false))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "to close parenthesis")?;
                return Ok(inner);
            }
            TokenKind::Ident(name) => {
                self.advance();
                // 调用的 '(' 必须和函数名在同一行
                if self.check(&TokenKind::LParen) && self.peek().line == token.line {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "to close argument list")?;
                    ExprKind::Call { name, args }
                } else {
                    ExprKind::Name(name)
                }
            }
            other => {
                return self.error(format!("expected expression, found {}", other.describe()));
            }
        };
        Ok(Expr { kind, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(unit: &SourceUnit, idx: usize) -> &FunctionDecl {
        let funcs: Vec<&FunctionDecl> = unit
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Function(f) => Some(f),
                _ => None,
            })
            .collect();
        funcs[idx]
    }

    #[test]
    fn parse_hooks_and_directives() {
        let unit = parse(
            r#"
            @repository "https://repo.example.com"
            @depends "net.example:util:1.0"

            @entrypoint
            fn start() {
                log "up"
            }

            fn greet(name: string, times: int) {
                return "hi " + name
            }
        "#,
        )
        .unwrap();

        assert_eq!(unit.items.len(), 4);
        assert!(matches!(&unit.items[0], Item::Directive { name, .. } if name == "repository"));
        let start = function(&unit, 0);
        assert_eq!(start.annotations[0].name, "entrypoint");
        let greet = function(&unit, 1);
        assert_eq!(greet.params.len(), 2);
        assert_eq!(greet.params[1].type_name, "int");
    }

    #[test]
    fn precedence() {
        let unit = parse("var x = 1 + 2 * 3 == 7 && true").unwrap();
        let Item::Global { init, .. } = &unit.items[0] else {
            panic!("expected global");
        };
        let ExprKind::Binary { op, lhs, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::And);
        let ExprKind::Binary { op, lhs, .. } = &lhs.kind else {
            panic!("expected comparison");
        };
        assert_eq!(*op, BinaryOp::Eq);
        let ExprKind::Binary { op, rhs, .. } = &lhs.kind else {
            panic!("expected sum");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let unit = parse("var x = 10 - 3 - 2").unwrap();
        let Item::Global { init, .. } = &unit.items[0] else {
            panic!("expected global");
        };
        let ExprKind::Binary { lhs, rhs, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        assert!(matches!(rhs.kind, ExprKind::Literal(Value::Int(2))));
    }

    #[test]
    fn else_if_chain() {
        let unit = parse(
            r#"
            fn pick(n: int) {
                if n < 0 { return "neg" } else if n == 0 { return "zero" } else { return "pos" }
            }
        "#,
        )
        .unwrap();
        let f = function(&unit, 0);
        let StmtKind::If { otherwise, .. } = &f.body[0].kind else {
            panic!("expected if");
        };
        let otherwise = otherwise.as_ref().unwrap();
        assert!(matches!(otherwise[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn bare_return_before_newline() {
        let unit = parse("fn f() {\n  return\n  log 1\n}").unwrap();
        let f = function(&unit, 0);
        assert!(matches!(f.body[0].kind, StmtKind::Return(None)));
        assert_eq!(f.body.len(), 2);
    }

    #[test]
    fn syntax_error_position() {
        let err = parse("fn f() {\n  let = 3\n}").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("variable name"));
    }

    #[test]
    fn dangling_annotation() {
        let err = parse("@entrypoint").unwrap_err();
        assert!(err.message.contains("followed by a function"));
    }

    #[test]
    fn unclosed_block() {
        assert!(parse("fn f() { log 1").is_err());
    }

    #[test]
    fn deep_parentheses_rejected() {
        // 默认 2 MiB 测试线程上运行
        let src = format!("fn f() {{ return {}1{} }}", "(".repeat(5000), ")".repeat(5000));
        let err = parse(&src).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("nesting"), "{}", err.message);

        let ok = format!("var x = {}1{}", "(".repeat(40), ")".repeat(40));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn deep_blocks_and_unary_rejected() {
        let src = format!(
            "fn f() {{ {}log 1{} }}",
            "if true { ".repeat(200),
            " }".repeat(200)
        );
        assert!(parse(&src).unwrap_err().message.contains("nesting"));

        let negations = format!("var x = {}1", "-".repeat(100_000));
        assert!(parse(&negations).unwrap_err().message.contains("nesting"));

        let chain = format!("fn f() {{ if false {{ }}{} }}", " else if false { }".repeat(5000));
        assert!(parse(&chain).unwrap_err().message.contains("nesting"));
    }

    #[test]
    fn long_operator_chain_rejected() {
        // 左结合的长链在语法树上同样很深
        let long = format!("var x = 1{}", " + 1".repeat(100_000));
        assert!(parse(&long).unwrap_err().message.contains("nesting"));
        let product = format!("var x = 1{}", " * 1".repeat(100_000));
        assert!(parse(&product).is_err());

        let short = format!("var x = \"a\"{}", " + \"b\"".repeat(50));
        assert!(parse(&short).is_ok());
    }
}
