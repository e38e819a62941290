//! Pseudo-assembly Parser
//!
//! Builds a [`Function`] with unlinked blocks from source text.
//!
//! # Block Formation
//! - Every `label:` opens a new block
//! - Instructions before the first label go into an unlabeled entry block
//! - A label directly followed by another label yields an empty block
//!
//! Branch targets are kept as label operands; resolving them is the CFG constructor's job.

use crate::backend::error::{IonError, IonResult, SourceLocation};
use crate::backend::ir::{BlockId, Function, Instruction, Opcode, Operand, VReg};
use crate::backend::lexer::{Lexer, Token, TokenKind};
use std::collections::HashSet;

/// Parse `source` into a function named `name`.
///
/// # Errors
/// Returns `IonError::ParseError` for lexical errors, unknown opcodes, duplicate labels and
/// operands that do not fit the opcode's shape.
///
/// # Examples
/// ```rust
/// use ion_core::backend::parser::parse_function;
///
/// let func = parse_function("main", "entry:\n  MOV %1, 0\n  RET %1\n")?;
/// assert_eq!(func.len(), 1);
/// # Ok::<(), ion_core::backend::error::IonError>(())
/// ```
pub fn parse_function(name: &str, source: &str) -> IonResult<Function> {
    let tokens = Lexer::tokenize(source)?;
    Parser::new(tokens).parse(name)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and the cursor never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn parse(mut self, name: &str) -> IonResult<Function> {
        let mut func = Function::new(name);
        let mut current: Option<BlockId> = None;
        let mut labels: HashSet<String> = HashSet::new();

        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Ident(ident) if self.peek_kind_at(1) == Some(&TokenKind::Colon) => {
                    if !labels.insert(ident.clone()) {
                        return Err(IonError::parse(
                            format!("duplicate label '{ident}'"),
                            token.location,
                        ));
                    }
                    self.advance();
                    self.advance();
                    current = Some(func.add_block(Some(ident.as_str())));
                    log::trace!("parser: opened block '{}'", ident);
                }
                TokenKind::Ident(_) => {
                    let inst = self.parse_instruction()?;
                    let id = match current {
                        Some(id) => id,
                        None => {
                            let id = func.add_block(None);
                            current = Some(id);
                            id
                        }
                    };
                    if let Some(block) = func.block_mut(id) {
                        block.push(inst);
                    }
                }
                other => {
                    return Err(IonError::parse(
                        format!("expected a label or an instruction, found {}", other.describe()),
                        token.location,
                    ));
                }
            }
        }

        log::debug!(
            "parsed function '{}': {} block(s), {} label(s)",
            func.name,
            func.len(),
            labels.len()
        );
        Ok(func)
    }

    fn parse_instruction(&mut self) -> IonResult<Instruction> {
        let head = self.advance();
        let TokenKind::Ident(mnemonic) = &head.kind else {
            return Err(IonError::parse("expected an opcode", head.location));
        };
        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| {
            IonError::parse(format!("unknown opcode '{mnemonic}'"), head.location)
        })?;

        let mut operands: Vec<(Operand, SourceLocation)> = Vec::new();
        if !self.at_line_end() {
            operands.push(self.parse_operand()?);
            while self.peek().kind == TokenKind::Comma {
                self.advance();
                operands.push(self.parse_operand()?);
            }
        }
        if !self.at_line_end() {
            let token = self.peek();
            return Err(IonError::parse(
                format!("expected ',' or end of line, found {}", token.kind.describe()),
                token.location,
            ));
        }

        let dest = if opcode.has_destination() {
            if operands.is_empty() {
                return Err(IonError::parse(
                    format!("{opcode} requires a destination register"),
                    head.location,
                ));
            }
            match operands.remove(0) {
                (Operand::Reg(reg), _) => Some(reg),
                (other, location) => {
                    return Err(IonError::parse(
                        format!("{opcode} destination must be a register, found '{other}'"),
                        location,
                    ));
                }
            }
        } else {
            None
        };

        let inst = Instruction::new(opcode, dest, operands.into_iter().map(|(op, _)| op));
        inst.validate_shape()
            .map_err(|message| IonError::parse(message, head.location))?;
        Ok(inst)
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn parse_operand(&mut self) -> IonResult<(Operand, SourceLocation)> {
        let token = self.advance();
        let operand = match token.kind {
            TokenKind::VReg(id) => Operand::Reg(VReg(id)),
            TokenKind::Int(value) => Operand::Imm(value),
            TokenKind::Ident(name) => Operand::Label(name),
            other => {
                return Err(IonError::parse(
                    format!("expected an operand, found {}", other.describe()),
                    token.location,
                ));
            }
        };
        Ok((operand, token.location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ir::TerminatorKind;

    #[test]
    fn test_parse_loop() {
        let source = "
        entry:
            MOV %1, 0
            JMP header
        header:
            BEQ %1, 10, exit
        body:
            ADD %1, %1, 1
            JMP header
        exit:
            RET %1
        ";
        let func = parse_function("loop", source).unwrap();
        let labels: Vec<_> = func.blocks().iter().map(|b| b.label().unwrap()).collect();
        assert_eq!(labels, ["entry", "header", "body", "exit"]);
        assert_eq!(func.blocks()[0].instructions.len(), 2);
        assert_eq!(func.blocks()[1].terminator_kind(), TerminatorKind::Branch);
        assert_eq!(func.blocks()[3].terminator_kind(), TerminatorKind::Return);
        assert!(!func.is_cfg_built());
    }

    #[test]
    fn test_destination_is_split_from_uses() {
        let func = parse_function("f", "ADD %3, %1, %2\n").unwrap();
        let inst = &func.blocks()[0].instructions[0];
        assert_eq!(inst.dest, Some(VReg(3)));
        assert_eq!(
            inst.uses.as_slice(),
            &[Operand::Reg(VReg(1)), Operand::Reg(VReg(2))]
        );
    }

    #[test]
    fn test_leading_instructions_get_unlabeled_block() {
        let func = parse_function("f", "MOV %1, 1\nnext:\nRET %1\n").unwrap();
        assert_eq!(func.len(), 2);
        assert_eq!(func.blocks()[0].label(), None);
        assert_eq!(func.blocks()[1].label(), Some("next"));
    }

    #[test]
    fn test_adjacent_labels_make_empty_block() {
        let func = parse_function("f", "a:\nb:\nRET\n").unwrap();
        assert_eq!(func.len(), 2);
        assert!(func.blocks()[0].instructions.is_empty());
    }

    #[test]
    fn test_unknown_opcode_reports_line() {
        let err = parse_function("f", "entry:\n  CALL foo\n").unwrap_err();
        assert_eq!(err.location(), Some(SourceLocation::new(2, 3)));
        assert!(err.to_string().contains("unknown opcode 'CALL'"));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let err = parse_function("f", "a:\nRET\na:\nRET\n").unwrap_err();
        assert!(err.to_string().contains("duplicate label 'a'"));
    }

    #[test]
    fn test_shape_errors() {
        assert!(parse_function("f", "MOV 1, 2\n").is_err());
        assert!(parse_function("f", "ADD %1, %2\n").is_err());
        assert!(parse_function("f", "JMP %1\n").is_err());
        assert!(parse_function("f", "MOV\n").is_err());
        assert!(parse_function("f", "RET %1 %2\n").is_err());
        assert!(parse_function("f", ": RET\n").is_err());
    }
}
