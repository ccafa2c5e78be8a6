//! Recursive-descent grammar over the token stream
//!
//! Statements and expressions cover the PHP subset the fact collector and
//! context classifier consume. Anything outside the subset surfaces as a
//! `ParseError` rather than silently wrong facts.

use super::ast::{AssignOp, Ast, AstBuilder, BinaryOp, IncDecOp, NodeId, NodeKind, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};
use super::ParseError;

pub(super) fn parse(source: &str) -> Result<Ast, ParseError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        builder: AstBuilder::new(),
    }
    .parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    builder: AstBuilder,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn column(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].column
    }

    fn bump(&mut self) -> TokenKind {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek().describe()
            )))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line(),
            column: self.column(),
            message: message.into(),
        }
    }

    /// Lowercased keyword at the cursor, if the cursor is on an identifier.
    fn keyword(&self) -> Option<String> {
        match self.peek() {
            TokenKind::Ident(name) => Some(name.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn keyword_is(&self, expected: &str) -> bool {
        self.keyword().as_deref() == Some(expected)
    }

    fn alloc(&mut self, line: usize, kind: NodeKind) -> NodeId {
        self.builder.alloc(line, kind)
    }

    // ---------------------------------------------------------- program

    fn parse_program(mut self) -> Result<Ast, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                _ => {
                    if let Some(stmt) = self.statement_opt()? {
                        body.push(stmt);
                    }
                }
            }
        }
        let root = self.alloc(1, NodeKind::Program { body });
        Ok(self.builder.finish(root))
    }

    /// Parses one statement, returning `None` for structural noise (open
    /// tags, `namespace`/`use` headers, empty statements).
    fn statement_opt(&mut self) -> Result<Option<NodeId>, ParseError> {
        loop {
            match self.peek() {
                TokenKind::OpenTag | TokenKind::CloseTag => {
                    self.bump();
                    continue;
                }
                TokenKind::InlineHtml(_) => {
                    let line = self.line();
                    if let TokenKind::InlineHtml(text) = self.bump() {
                        return Ok(Some(self.alloc(line, NodeKind::InlineHtml { text })));
                    }
                    unreachable!("peeked InlineHtml");
                }
                TokenKind::OpenTagEcho => {
                    self.bump();
                    return self.short_echo().map(Some);
                }
                TokenKind::Semicolon => {
                    self.bump();
                    return Ok(None);
                }
                TokenKind::Eof => return Ok(None),
                _ => return self.statement(),
            }
        }
    }

    fn statement(&mut self) -> Result<Option<NodeId>, ParseError> {
        if let Some(keyword) = self.keyword() {
            match keyword.as_str() {
                "echo" => return self.echo_statement().map(Some),
                "print" => return self.print_statement().map(Some),
                "if" => return self.if_statement().map(Some),
                "while" => return self.while_statement().map(Some),
                "do" => return self.do_while_statement().map(Some),
                "for" => return self.for_statement().map(Some),
                "foreach" => return self.foreach_statement().map(Some),
                "switch" => return self.switch_statement().map(Some),
                "function" => {
                    // distinguish a declaration from a closure expression
                    if matches!(self.peek_at(1), TokenKind::Ident(_))
                        || matches!(self.peek_at(1), TokenKind::Amp)
                    {
                        return self.function_decl().map(Some);
                    }
                }
                "abstract" | "final" => {
                    self.bump();
                    return self.statement();
                }
                "class" | "interface" | "trait" => return self.class_decl().map(Some),
                "return" => return self.return_statement().map(Some),
                "break" => return self.loop_jump(NodeKind::Break).map(Some),
                "continue" => return self.loop_jump(NodeKind::Continue).map(Some),
                "global" => return self.global_statement().map(Some),
                "unset" => return self.unset_statement().map(Some),
                "throw" => {
                    let line = self.line();
                    self.bump();
                    let expr = self.expression()?;
                    self.end_statement()?;
                    return Ok(Some(self.alloc(line, NodeKind::ExprStmt { expr })));
                }
                "try" => return self.try_statement().map(Some),
                "namespace" => {
                    self.bump();
                    while !matches!(
                        self.peek(),
                        TokenKind::Semicolon | TokenKind::LBrace | TokenKind::Eof
                    ) {
                        self.bump();
                    }
                    self.eat(&TokenKind::Semicolon);
                    return Ok(None);
                }
                "use" => {
                    self.bump();
                    while !matches!(self.peek(), TokenKind::Semicolon | TokenKind::Eof) {
                        self.bump();
                    }
                    self.eat(&TokenKind::Semicolon);
                    return Ok(None);
                }
                "static" => {
                    // static local variables: `static $cache = [];`
                    if matches!(self.peek_at(1), TokenKind::Variable(_)) {
                        self.bump();
                        return self.expression_statement().map(Some);
                    }
                }
                "elseif" | "else" | "endif" | "endwhile" | "endfor" | "endforeach"
                | "endswitch" | "case" | "default" | "catch" | "finally" => {
                    return Err(self.error(format!("unexpected `{}`", keyword)));
                }
                _ => {}
            }
        }
        if self.peek() == &TokenKind::LBrace {
            return self.block().map(Some);
        }
        self.expression_statement().map(Some)
    }

    fn expression_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::ExprStmt { expr }))
    }

    fn end_statement(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        match self.peek() {
            TokenKind::CloseTag | TokenKind::Eof | TokenKind::RBrace => Ok(()),
            other => Err(self.error(format!("expected `;`, found {}", other.describe()))),
        }
    }

    // ------------------------------------------------------- statements

    fn short_echo(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        let mut args = vec![self.expression()?];
        while self.eat(&TokenKind::Comma) {
            args.push(self.expression()?);
        }
        self.eat(&TokenKind::Semicolon);
        Ok(self.alloc(line, NodeKind::Echo { args }))
    }

    fn echo_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let mut args = vec![self.expression()?];
        while self.eat(&TokenKind::Comma) {
            args.push(self.expression()?);
        }
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::Echo { args }))
    }

    fn print_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let args = vec![self.expression()?];
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::Echo { args }))
    }

    fn if_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;

        if self.eat(&TokenKind::Colon) {
            let then_branch =
                self.alt_block(&["elseif", "else", "endif"], line)?;
            let else_branch = self.alt_if_tail()?;
            return Ok(self.alloc(
                line,
                NodeKind::If {
                    cond,
                    then_branch,
                    else_branch,
                },
            ));
        }

        let then_branch = self.required_statement()?;
        let else_branch = if self.keyword_is("elseif") {
            Some(self.elseif_as_if()?)
        } else if self.keyword_is("else") {
            self.bump();
            Some(self.required_statement()?)
        } else {
            None
        };
        Ok(self.alloc(
            line,
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            },
        ))
    }

    /// `elseif (...)` parsed as a nested `if` in the else slot.
    fn elseif_as_if(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = self.required_statement()?;
        let else_branch = if self.keyword_is("elseif") {
            Some(self.elseif_as_if()?)
        } else if self.keyword_is("else") {
            self.bump();
            Some(self.required_statement()?)
        } else {
            None
        };
        Ok(self.alloc(
            line,
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            },
        ))
    }

    /// Tail of an alternative-syntax `if`: `elseif ... / else ... / endif;`.
    fn alt_if_tail(&mut self) -> Result<Option<NodeId>, ParseError> {
        if self.keyword_is("elseif") {
            let line = self.line();
            self.bump();
            self.expect(&TokenKind::LParen)?;
            let cond = self.expression()?;
            self.expect(&TokenKind::RParen)?;
            self.expect(&TokenKind::Colon)?;
            let then_branch = self.alt_block(&["elseif", "else", "endif"], line)?;
            let else_branch = self.alt_if_tail()?;
            return Ok(Some(self.alloc(
                line,
                NodeKind::If {
                    cond,
                    then_branch,
                    else_branch,
                },
            )));
        }
        if self.keyword_is("else") {
            let line = self.line();
            self.bump();
            self.expect(&TokenKind::Colon)?;
            let body = self.alt_block(&["endif"], line)?;
            self.expect_keyword("endif")?;
            self.eat(&TokenKind::Semicolon);
            return Ok(Some(body));
        }
        self.expect_keyword("endif")?;
        self.eat(&TokenKind::Semicolon);
        Ok(None)
    }

    fn while_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = if self.eat(&TokenKind::Colon) {
            let body = self.alt_block(&["endwhile"], line)?;
            self.expect_keyword("endwhile")?;
            self.eat(&TokenKind::Semicolon);
            body
        } else {
            self.required_statement()?
        };
        Ok(self.alloc(line, NodeKind::While { cond, body }))
    }

    fn do_while_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let body = self.required_statement()?;
        self.expect_keyword("while")?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::While { cond, body }))
    }

    fn for_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let init = self.expression_list_until(&TokenKind::Semicolon)?;
        self.expect(&TokenKind::Semicolon)?;
        let cond = self.expression_list_until(&TokenKind::Semicolon)?;
        self.expect(&TokenKind::Semicolon)?;
        let step = self.expression_list_until(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen)?;
        let body = if self.eat(&TokenKind::Colon) {
            let body = self.alt_block(&["endfor"], line)?;
            self.expect_keyword("endfor")?;
            self.eat(&TokenKind::Semicolon);
            body
        } else {
            self.required_statement()?
        };
        Ok(self.alloc(
            line,
            NodeKind::For {
                init,
                cond,
                step,
                body,
            },
        ))
    }

    fn foreach_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let source = self.expression()?;
        self.expect_keyword("as")?;
        self.eat(&TokenKind::Amp);
        let first = self.expression()?;
        let (key, value) = if self.eat(&TokenKind::DoubleArrow) {
            self.eat(&TokenKind::Amp);
            (Some(first), self.expression()?)
        } else {
            (None, first)
        };
        self.expect(&TokenKind::RParen)?;
        let body = if self.eat(&TokenKind::Colon) {
            let body = self.alt_block(&["endforeach"], line)?;
            self.expect_keyword("endforeach")?;
            self.eat(&TokenKind::Semicolon);
            body
        } else {
            self.required_statement()?
        };
        Ok(self.alloc(
            line,
            NodeKind::Foreach {
                source,
                key,
                value,
                body,
            },
        ))
    }

    fn switch_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let subject = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        let alt = self.eat(&TokenKind::Colon);
        if !alt {
            self.expect(&TokenKind::LBrace)?;
        }

        let mut cases = Vec::new();
        loop {
            if matches!(
                self.peek(),
                TokenKind::OpenTag | TokenKind::CloseTag | TokenKind::InlineHtml(_)
            ) {
                self.bump();
                continue;
            }
            if self.keyword_is("case") {
                let case_line = self.line();
                self.bump();
                let test = self.expression()?;
                if !self.eat(&TokenKind::Colon) {
                    self.expect(&TokenKind::Semicolon)?;
                }
                let body = self.case_body(alt)?;
                cases.push(self.alloc(
                    case_line,
                    NodeKind::Case {
                        test: Some(test),
                        body,
                    },
                ));
            } else if self.keyword_is("default") {
                let case_line = self.line();
                self.bump();
                if !self.eat(&TokenKind::Colon) {
                    self.expect(&TokenKind::Semicolon)?;
                }
                let body = self.case_body(alt)?;
                cases.push(self.alloc(case_line, NodeKind::Case { test: None, body }));
            } else {
                break;
            }
        }

        if alt {
            self.expect_keyword("endswitch")?;
            self.eat(&TokenKind::Semicolon);
        } else {
            self.expect(&TokenKind::RBrace)?;
        }
        Ok(self.alloc(line, NodeKind::Switch { subject, cases }))
    }

    fn case_body(&mut self, alt: bool) -> Result<Vec<NodeId>, ParseError> {
        let mut body = Vec::new();
        loop {
            if matches!(self.peek(), TokenKind::OpenTag | TokenKind::CloseTag) {
                self.bump();
                continue;
            }
            if self.keyword_is("case") || self.keyword_is("default") {
                break;
            }
            if alt && self.keyword_is("endswitch") {
                break;
            }
            if !alt && self.peek() == &TokenKind::RBrace {
                break;
            }
            if self.peek() == &TokenKind::Eof {
                break;
            }
            if let Some(stmt) = self.statement_opt()? {
                body.push(stmt);
            }
        }
        Ok(body)
    }

    fn function_decl(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.eat(&TokenKind::Amp);
        let name = match self.bump() {
            TokenKind::Ident(name) => name,
            other => {
                return Err(self.error(format!(
                    "expected function name, found {}",
                    other.describe()
                )))
            }
        };
        let params = self.param_list()?;
        // return type hint
        if self.eat(&TokenKind::Colon) {
            self.eat(&TokenKind::Question);
            if let TokenKind::Ident(_) = self.peek() {
                self.bump();
            }
        }
        let body = self.block()?;
        Ok(self.alloc(line, NodeKind::FunctionDecl { name, params, body }))
    }

    fn param_list(&mut self) -> Result<Vec<NodeId>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.peek() != &TokenKind::RParen {
            let line = self.line();
            let mut by_ref = false;
            loop {
                match self.peek() {
                    TokenKind::Ident(_) | TokenKind::Question => {
                        self.bump();
                    }
                    TokenKind::Amp => {
                        by_ref = true;
                        self.bump();
                    }
                    TokenKind::Ellipsis => {
                        self.bump();
                    }
                    _ => break,
                }
            }
            let name = match self.bump() {
                TokenKind::Variable(name) => name,
                other => {
                    return Err(self.error(format!(
                        "expected parameter, found {}",
                        other.describe()
                    )))
                }
            };
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.expression()?)
            } else {
                None
            };
            params.push(self.alloc(
                line,
                NodeKind::Param {
                    name,
                    by_ref,
                    default,
                },
            ));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn class_decl(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let name = match self.bump() {
            TokenKind::Ident(name) => name,
            other => {
                return Err(self.error(format!("expected class name, found {}", other.describe())))
            }
        };
        while !matches!(self.peek(), TokenKind::LBrace | TokenKind::Eof) {
            self.bump(); // extends / implements clauses
        }
        self.expect(&TokenKind::LBrace)?;

        let mut members = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            if let Some(member) = self.class_member()? {
                members.push(member);
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(self.alloc(line, NodeKind::ClassDecl { name, members }))
    }

    fn class_member(&mut self) -> Result<Option<NodeId>, ParseError> {
        while let Some(keyword) = self.keyword() {
            match keyword.as_str() {
                "public" | "protected" | "private" | "static" | "abstract" | "final"
                | "readonly" | "var" => {
                    self.bump();
                }
                "function" => return self.function_decl().map(Some),
                "const" => {
                    while !matches!(self.peek(), TokenKind::Semicolon | TokenKind::Eof) {
                        self.bump();
                    }
                    self.eat(&TokenKind::Semicolon);
                    return Ok(None);
                }
                "use" => {
                    while !matches!(self.peek(), TokenKind::Semicolon | TokenKind::Eof) {
                        self.bump();
                    }
                    self.eat(&TokenKind::Semicolon);
                    return Ok(None);
                }
                _ => {
                    // type hint before a property declaration
                    self.bump();
                }
            }
        }
        match self.peek() {
            TokenKind::Variable(_) => {
                // property declaration, optional default
                self.bump();
                if self.eat(&TokenKind::Assign) {
                    self.expression()?;
                }
                self.eat(&TokenKind::Semicolon);
                Ok(None)
            }
            TokenKind::Question => {
                self.bump();
                Ok(None)
            }
            other => Err(self.error(format!(
                "unexpected {} in class body",
                other.describe()
            ))),
        }
    }

    fn return_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let value = if matches!(
            self.peek(),
            TokenKind::Semicolon | TokenKind::CloseTag | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.expression()?)
        };
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::Return { value }))
    }

    fn loop_jump(&mut self, kind: NodeKind) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        if let TokenKind::Number(_) = self.peek() {
            self.bump();
        }
        self.end_statement()?;
        Ok(self.alloc(line, kind))
    }

    fn global_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let mut vars = Vec::new();
        loop {
            let var_line = self.line();
            match self.bump() {
                TokenKind::Variable(name) => {
                    vars.push(self.alloc(var_line, NodeKind::Variable { name }));
                }
                other => {
                    return Err(self.error(format!(
                        "expected variable, found {}",
                        other.describe()
                    )))
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::Global { vars }))
    }

    fn unset_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.peek() != &TokenKind::RParen {
            args.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.end_statement()?;
        Ok(self.alloc(line, NodeKind::Unset { args }))
    }

    fn try_statement(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.bump();
        let mut body = vec![self.block()?];
        while self.keyword_is("catch") {
            self.bump();
            self.expect(&TokenKind::LParen)?;
            while !matches!(self.peek(), TokenKind::RParen | TokenKind::Eof) {
                self.bump();
            }
            self.expect(&TokenKind::RParen)?;
            body.push(self.block()?);
        }
        if self.keyword_is("finally") {
            self.bump();
            body.push(self.block()?);
        }
        Ok(self.alloc(line, NodeKind::Block { body }))
    }

    fn block(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            if let Some(stmt) = self.statement_opt()? {
                body.push(stmt);
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(self.alloc(line, NodeKind::Block { body }))
    }

    fn required_statement(&mut self) -> Result<NodeId, ParseError> {
        loop {
            match self.statement_opt()? {
                Some(stmt) => return Ok(stmt),
                None => {
                    if self.peek() == &TokenKind::Eof {
                        return Err(self.error("unexpected end of file"));
                    }
                }
            }
        }
    }

    /// Alternative-syntax body: statements until one of the stop keywords.
    fn alt_block(&mut self, stops: &[&str], line: usize) -> Result<NodeId, ParseError> {
        let mut body = Vec::new();
        loop {
            if matches!(self.peek(), TokenKind::OpenTag | TokenKind::CloseTag) {
                self.bump();
                continue;
            }
            if let Some(keyword) = self.keyword() {
                if stops.contains(&keyword.as_str()) {
                    break;
                }
            }
            if self.peek() == &TokenKind::Eof {
                return Err(self.error(format!("expected one of {:?}", stops)));
            }
            if let Some(stmt) = self.statement_opt()? {
                body.push(stmt);
            }
        }
        Ok(self.alloc(line, NodeKind::Block { body }))
    }

    fn expect_keyword(&mut self, expected: &str) -> Result<(), ParseError> {
        if self.keyword_is(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected `{}`, found {}",
                expected,
                self.peek().describe()
            )))
        }
    }

    fn expression_list_until(&mut self, stop: &TokenKind) -> Result<Vec<NodeId>, ParseError> {
        let mut out = Vec::new();
        if self.peek() == stop {
            return Ok(out);
        }
        out.push(self.expression()?);
        while self.eat(&TokenKind::Comma) {
            out.push(self.expression()?);
        }
        Ok(out)
    }

    // ------------------------------------------------------ expressions

    fn expression(&mut self) -> Result<NodeId, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<NodeId, ParseError> {
        let left = self.ternary()?;
        let op = match self.peek() {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::MulAssign => Some(AssignOp::Mul),
            TokenKind::DivAssign => Some(AssignOp::Div),
            TokenKind::ConcatAssign => Some(AssignOp::Concat),
            TokenKind::CoalesceAssign => Some(AssignOp::Assign),
            _ => None,
        };
        if let Some(op) = op {
            let line = self.builder.line(left);
            self.bump();
            self.eat(&TokenKind::Amp); // assignment by reference
            let value = self.assignment()?;
            return Ok(self.alloc(
                line,
                NodeKind::Assign {
                    op,
                    target: left,
                    value,
                },
            ));
        }
        Ok(left)
    }

    fn ternary(&mut self) -> Result<NodeId, ParseError> {
        let cond = self.coalesce()?;
        if self.eat(&TokenKind::Question) {
            let line = self.line();
            let then_branch = if self.peek() == &TokenKind::Colon {
                None
            } else {
                Some(self.expression()?)
            };
            self.expect(&TokenKind::Colon)?;
            let else_branch = self.ternary()?;
            return Ok(self.alloc(
                line,
                NodeKind::Ternary {
                    cond,
                    then_branch,
                    else_branch,
                },
            ));
        }
        Ok(cond)
    }

    fn coalesce(&mut self) -> Result<NodeId, ParseError> {
        let left = self.logical_or()?;
        if self.eat(&TokenKind::Coalesce) {
            let line = self.line();
            let right = self.coalesce()?;
            return Ok(self.alloc(
                line,
                NodeKind::Binary {
                    op: BinaryOp::Coalesce,
                    left,
                    right,
                },
            ));
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.logical_and()?;
        loop {
            let matched = self.peek() == &TokenKind::OrOr || self.keyword_is("or");
            if !matched {
                return Ok(left);
            }
            let line = self.line();
            self.bump();
            let right = self.logical_and()?;
            left = self.alloc(
                line,
                NodeKind::Binary {
                    op: BinaryOp::Or,
                    left,
                    right,
                },
            );
        }
    }

    fn logical_and(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.bitwise()?;
        loop {
            let matched = self.peek() == &TokenKind::AndAnd
                || self.keyword_is("and")
                || self.keyword_is("xor");
            if !matched {
                return Ok(left);
            }
            let line = self.line();
            self.bump();
            let right = self.bitwise()?;
            left = self.alloc(
                line,
                NodeKind::Binary {
                    op: BinaryOp::And,
                    left,
                    right,
                },
            );
        }
    }

    fn bitwise(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.equality()?;
        loop {
            let op = match self.peek() {
                TokenKind::Amp => BinaryOp::BitAnd,
                TokenKind::Pipe => BinaryOp::BitOr,
                TokenKind::Caret => BinaryOp::BitXor,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.equality()?;
            left = self.alloc(line, NodeKind::Binary { op, left, right });
        }
    }

    fn equality(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Identical => BinaryOp::Identical,
                TokenKind::NotIdentical => BinaryOp::NotIdentical,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.relational()?;
            left = self.alloc(line, NodeKind::Binary { op, left, right });
        }
    }

    fn relational(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.additive()?;
            left = self.alloc(line, NodeKind::Binary { op, left, right });
        }
    }

    fn additive(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Dot => BinaryOp::Concat,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.multiplicative()?;
            left = self.alloc(line, NodeKind::Binary { op, left, right });
        }
    }

    fn multiplicative(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            let line = self.line();
            self.bump();
            let right = self.unary()?;
            left = self.alloc(line, NodeKind::Binary { op, left, right });
        }
    }

    fn unary(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        match self.peek() {
            TokenKind::Not => {
                self.bump();
                let operand = self.unary()?;
                return Ok(self.alloc(
                    line,
                    NodeKind::Unary {
                        op: UnaryOp::Not,
                        operand,
                    },
                ));
            }
            TokenKind::Minus => {
                self.bump();
                let operand = self.unary()?;
                return Ok(self.alloc(
                    line,
                    NodeKind::Unary {
                        op: UnaryOp::Neg,
                        operand,
                    },
                ));
            }
            TokenKind::Plus => {
                self.bump();
                let operand = self.unary()?;
                return Ok(self.alloc(
                    line,
                    NodeKind::Unary {
                        op: UnaryOp::Plus,
                        operand,
                    },
                ));
            }
            TokenKind::Inc => {
                self.bump();
                let target = self.unary()?;
                return Ok(self.alloc(
                    line,
                    NodeKind::IncDec {
                        op: IncDecOp::Inc,
                        prefix: true,
                        target,
                    },
                ));
            }
            TokenKind::Dec => {
                self.bump();
                let target = self.unary()?;
                return Ok(self.alloc(
                    line,
                    NodeKind::IncDec {
                        op: IncDecOp::Dec,
                        prefix: true,
                        target,
                    },
                ));
            }
            TokenKind::Amp => {
                self.bump();
                return self.unary();
            }
            TokenKind::LParen => {
                // cast expressions: `(int)$x`
                if let TokenKind::Ident(name) = self.peek_at(1) {
                    let is_cast = matches!(
                        name.to_ascii_lowercase().as_str(),
                        "int" | "integer" | "float" | "double" | "string" | "bool" | "boolean"
                            | "array" | "object"
                    ) && self.peek_at(2) == &TokenKind::RParen;
                    if is_cast {
                        self.bump();
                        self.bump();
                        self.bump();
                        return self.unary();
                    }
                }
            }
            _ => {}
        }

        if let Some(keyword) = self.keyword() {
            match keyword.as_str() {
                "new" => {
                    self.bump();
                    let class = match self.bump() {
                        TokenKind::Ident(name) => name,
                        TokenKind::Variable(name) => format!("${}", name),
                        other => {
                            return Err(self.error(format!(
                                "expected class name, found {}",
                                other.describe()
                            )))
                        }
                    };
                    let args = if self.peek() == &TokenKind::LParen {
                        self.call_args()?
                    } else {
                        Vec::new()
                    };
                    let node = self.alloc(line, NodeKind::New { class, args });
                    return self.postfix_operators(node);
                }
                "print" => {
                    self.bump();
                    let args = vec![self.expression()?];
                    return Ok(self.alloc(line, NodeKind::Echo { args }));
                }
                "clone" => {
                    self.bump();
                    return self.unary();
                }
                "function" => {
                    self.bump();
                    self.eat(&TokenKind::Amp);
                    let params = self.param_list()?;
                    if self.keyword_is("use") {
                        self.bump();
                        self.expect(&TokenKind::LParen)?;
                        while !matches!(self.peek(), TokenKind::RParen | TokenKind::Eof) {
                            self.bump();
                        }
                        self.expect(&TokenKind::RParen)?;
                    }
                    if self.eat(&TokenKind::Colon) {
                        self.eat(&TokenKind::Question);
                        if let TokenKind::Ident(_) = self.peek() {
                            self.bump();
                        }
                    }
                    let body = self.block()?;
                    return Ok(self.alloc(
                        line,
                        NodeKind::FunctionDecl {
                            name: String::new(),
                            params,
                            body,
                        },
                    ));
                }
                "fn" => {
                    self.bump();
                    let params = self.param_list()?;
                    if self.eat(&TokenKind::Colon) {
                        self.eat(&TokenKind::Question);
                        if let TokenKind::Ident(_) = self.peek() {
                            self.bump();
                        }
                    }
                    self.expect(&TokenKind::DoubleArrow)?;
                    let body = self.expression()?;
                    return Ok(self.alloc(
                        line,
                        NodeKind::FunctionDecl {
                            name: String::new(),
                            params,
                            body,
                        },
                    ));
                }
                "require" | "include" | "require_once" | "include_once" => {
                    self.bump();
                    let arg = self.expression()?;
                    return Ok(self.alloc(
                        line,
                        NodeKind::FunctionCall {
                            name: keyword,
                            args: vec![arg],
                        },
                    ));
                }
                _ => {}
            }
        }

        let node = self.primary()?;
        self.postfix_operators(node)
    }

    fn postfix_operators(&mut self, mut node: NodeId) -> Result<NodeId, ParseError> {
        loop {
            match self.peek() {
                TokenKind::Arrow => {
                    let line = self.line();
                    self.bump();
                    let property = match self.bump() {
                        TokenKind::Ident(name) => name,
                        TokenKind::Variable(name) => format!("${}", name),
                        TokenKind::LBrace => {
                            self.expression()?;
                            self.expect(&TokenKind::RBrace)?;
                            String::from("{expr}")
                        }
                        other => {
                            return Err(self.error(format!(
                                "expected property or method name, found {}",
                                other.describe()
                            )))
                        }
                    };
                    if self.peek() == &TokenKind::LParen {
                        let args = self.call_args()?;
                        node = self.alloc(
                            line,
                            NodeKind::MethodCall {
                                target: node,
                                method: property,
                                args,
                            },
                        );
                    } else {
                        node = self.alloc(
                            line,
                            NodeKind::PropertyFetch {
                                target: node,
                                property,
                            },
                        );
                    }
                }
                TokenKind::DoubleColon => {
                    let line = self.line();
                    self.bump();
                    let class = self.node_name(node);
                    let member = match self.bump() {
                        TokenKind::Ident(name) => name,
                        TokenKind::Variable(name) => format!("${}", name),
                        other => {
                            return Err(self.error(format!(
                                "expected static member, found {}",
                                other.describe()
                            )))
                        }
                    };
                    if self.peek() == &TokenKind::LParen {
                        let args = self.call_args()?;
                        node = self.alloc(
                            line,
                            NodeKind::StaticCall {
                                class,
                                method: member,
                                args,
                            },
                        );
                    } else {
                        node = self.alloc(
                            line,
                            NodeKind::Constant {
                                name: format!("{}::{}", class, member),
                            },
                        );
                    }
                }
                TokenKind::LBracket => {
                    let line = self.line();
                    self.bump();
                    let index = if self.peek() == &TokenKind::RBracket {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.expect(&TokenKind::RBracket)?;
                    node = self.alloc(
                        line,
                        NodeKind::Index {
                            target: node,
                            index,
                        },
                    );
                }
                TokenKind::LBrace => {
                    // `{` after an expression starts a block, not the legacy
                    // curly string offset; stop the postfix chain here
                    break;
                }
                TokenKind::Inc => {
                    let line = self.line();
                    self.bump();
                    node = self.alloc(
                        line,
                        NodeKind::IncDec {
                            op: IncDecOp::Inc,
                            prefix: false,
                            target: node,
                        },
                    );
                }
                TokenKind::Dec => {
                    let line = self.line();
                    self.bump();
                    node = self.alloc(
                        line,
                        NodeKind::IncDec {
                            op: IncDecOp::Dec,
                            prefix: false,
                            target: node,
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(node)
    }

    /// Name of the class side of `X::member`.
    fn node_name(&self, node: NodeId) -> String {
        match self.builder.kind(node) {
            NodeKind::Constant { name } => name.clone(),
            NodeKind::Variable { name } => format!("${}", name),
            _ => String::from("static"),
        }
    }

    fn primary(&mut self) -> Result<NodeId, ParseError> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Variable(name) => {
                self.bump();
                Ok(self.alloc(line, NodeKind::Variable { name }))
            }
            TokenKind::Number(raw) => {
                self.bump();
                Ok(self.alloc(line, NodeKind::Number { raw }))
            }
            TokenKind::SingleQuoted(value) => {
                self.bump();
                Ok(self.alloc(line, NodeKind::StringLiteral { value }))
            }
            TokenKind::DoubleQuoted(raw) => {
                self.bump();
                Ok(self.interpolated_string(line, &raw))
            }
            TokenKind::LBracket => {
                self.bump();
                let entries = self.array_entries(&TokenKind::RBracket)?;
                self.expect(&TokenKind::RBracket)?;
                Ok(self.alloc(line, NodeKind::ArrayLiteral { entries }))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.bump();
                let lower = name.to_ascii_lowercase();
                match lower.as_str() {
                    "true" => Ok(self.alloc(line, NodeKind::Bool { value: true })),
                    "false" => Ok(self.alloc(line, NodeKind::Bool { value: false })),
                    "null" => Ok(self.alloc(line, NodeKind::Null)),
                    "isset" => {
                        self.expect(&TokenKind::LParen)?;
                        let mut args = Vec::new();
                        while self.peek() != &TokenKind::RParen {
                            args.push(self.expression()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RParen)?;
                        Ok(self.alloc(line, NodeKind::Isset { args }))
                    }
                    "empty" => {
                        self.expect(&TokenKind::LParen)?;
                        let arg = self.expression()?;
                        self.expect(&TokenKind::RParen)?;
                        Ok(self.alloc(line, NodeKind::Empty { arg }))
                    }
                    "array" | "list" if self.peek() == &TokenKind::LParen => {
                        self.bump();
                        let entries = self.array_entries(&TokenKind::RParen)?;
                        self.expect(&TokenKind::RParen)?;
                        Ok(self.alloc(line, NodeKind::ArrayLiteral { entries }))
                    }
                    _ => {
                        if self.peek() == &TokenKind::LParen {
                            let args = self.call_args()?;
                            Ok(self.alloc(line, NodeKind::FunctionCall { name, args }))
                        } else {
                            Ok(self.alloc(line, NodeKind::Constant { name }))
                        }
                    }
                }
            }
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn call_args(&mut self) -> Result<Vec<NodeId>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.peek() != &TokenKind::RParen {
            self.eat(&TokenKind::Ellipsis);
            self.eat(&TokenKind::Amp);
            args.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn array_entries(&mut self, stop: &TokenKind) -> Result<Vec<NodeId>, ParseError> {
        let mut entries = Vec::new();
        while self.peek() != stop {
            let line = self.line();
            self.eat(&TokenKind::Amp);
            let first = self.expression()?;
            let entry = if self.eat(&TokenKind::DoubleArrow) {
                self.eat(&TokenKind::Amp);
                let value = self.expression()?;
                NodeKind::ArrayEntry {
                    key: Some(first),
                    value,
                }
            } else {
                NodeKind::ArrayEntry {
                    key: None,
                    value: first,
                }
            };
            entries.push(self.alloc(line, entry));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(entries)
    }

    /// Splits a raw double-quoted body into literal parts and interpolated
    /// variable references.
    fn interpolated_string(&mut self, line: usize, raw: &str) -> NodeId {
        let bytes = raw.as_bytes();
        let mut parts: Vec<NodeId> = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < bytes.len() {
            let byte = bytes[i];
            if byte == b'\\' && i + 1 < bytes.len() {
                literal.push('\\');
                literal.push(bytes[i + 1] as char);
                i += 2;
                continue;
            }
            if byte == b'$' && i + 1 < bytes.len() && is_ident_start(bytes[i + 1]) {
                if !literal.is_empty() {
                    let text = std::mem::take(&mut literal);
                    parts.push(self.alloc(line, NodeKind::StringPart { text }));
                }
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_ident_byte(bytes[end]) {
                    end += 1;
                }
                let name = raw[start..end].to_string();
                let mut node = self.alloc(line, NodeKind::Variable { name });
                i = end;
                // simple `$arr[key]` / `$obj->prop` suffixes interpolate too
                if i < bytes.len() && bytes[i] == b'[' {
                    if let Some(close) = raw[i..].find(']') {
                        let key_text = raw[i + 1..i + close].to_string();
                        let key = self.alloc(line, NodeKind::StringLiteral { value: key_text });
                        node = self.alloc(
                            line,
                            NodeKind::Index {
                                target: node,
                                index: Some(key),
                            },
                        );
                        i += close + 1;
                    }
                } else if i + 1 < bytes.len() && bytes[i] == b'-' && bytes[i + 1] == b'>' {
                    let prop_start = i + 2;
                    let mut prop_end = prop_start;
                    while prop_end < bytes.len() && is_ident_byte(bytes[prop_end]) {
                        prop_end += 1;
                    }
                    if prop_end > prop_start {
                        let property = raw[prop_start..prop_end].to_string();
                        node = self.alloc(
                            line,
                            NodeKind::PropertyFetch {
                                target: node,
                                property,
                            },
                        );
                        i = prop_end;
                    }
                }
                parts.push(node);
                continue;
            }
            if byte == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'$' {
                // `{$expr}`: pull out the leading variable name
                if let Some(close) = raw[i..].find('}') {
                    let inner = &raw[i + 2..i + close];
                    let mut end = 0;
                    let inner_bytes = inner.as_bytes();
                    while end < inner_bytes.len() && is_ident_byte(inner_bytes[end]) {
                        end += 1;
                    }
                    if end > 0 {
                        if !literal.is_empty() {
                            let text = std::mem::take(&mut literal);
                            parts.push(self.alloc(line, NodeKind::StringPart { text }));
                        }
                        let name = inner[..end].to_string();
                        let node = self.alloc(line, NodeKind::Variable { name });
                        parts.push(node);
                        i += close + 1;
                        continue;
                    }
                }
            }
            let ch = raw[i..].chars().next().unwrap_or('\0');
            literal.push(ch);
            i += ch.len_utf8();
        }

        let has_vars = !parts.is_empty();
        if !has_vars {
            return self.alloc(
                line,
                NodeKind::StringLiteral {
                    value: raw.to_string(),
                },
            );
        }
        if !literal.is_empty() {
            let text = std::mem::take(&mut literal);
            parts.push(self.alloc(line, NodeKind::StringPart { text }));
        }
        self.alloc(line, NodeKind::InterpolatedString { parts })
    }
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
}
