use heapless::{String, Vec};
use thiserror_no_std::Error;

use crate::{Instruction, InstructionSet, Opcode, Operand, Register, Word};

/// Longest line text kept in a [`ParseError`]; longer lines are cut.
pub const LINE_TEXT_CAP: usize = 64;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unknown mnemonic")]
    UnknownMnemonic,
    #[error("operand is not a register or a number")]
    InvalidNumber,
    #[error("expected a single lowercase letter register")]
    InvalidRegister,
    #[error("expected {expected} operands but found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("program does not fit in the program buffer")]
    ProgramTooLong,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}: `{text}`")]
pub struct ParseError {
    line: usize,
    text: String<LINE_TEXT_CAP>,
    kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, raw: &str, kind: ParseErrorKind) -> Self {
        let mut text = String::new();
        for ch in raw.chars() {
            if text.push(ch).is_err() {
                break;
            }
        }
        Self { line, text, kind }
    }

    /// Zero based index of the line in the program text.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }
}

/// Turns program text in to instructions one line at a time.
///
/// Blank lines are skipped but still counted, so errors name the line as
/// it appears in the original text.
pub struct Parser<const PROGRAM_CAP: usize> {
    instruction_set: InstructionSet,
    program: Vec<Instruction, PROGRAM_CAP>,
    line_index: usize,
}

impl<const PROGRAM_CAP: usize> Parser<PROGRAM_CAP> {
    pub fn new(instruction_set: InstructionSet) -> Self {
        Self {
            instruction_set,
            program: Vec::new(),
            line_index: 0,
        }
    }

    pub fn instruction_set(&self) -> InstructionSet {
        self.instruction_set
    }

    pub fn add_line(&mut self, line: &str) -> Result<(), ParseError> {
        let index = self.line_index;
        self.line_index = self.line_index.saturating_add(1);

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let instruction = self
            .parse_instruction(trimmed)
            .map_err(|kind| ParseError::new(index, line, kind))?;
        self.program
            .push(instruction)
            .map_err(|_| ParseError::new(index, line, ParseErrorKind::ProgramTooLong))
    }

    pub fn finish(self) -> Vec<Instruction, PROGRAM_CAP> {
        self.program
    }

    fn parse_instruction(&self, line: &str) -> Result<Instruction, ParseErrorKind> {
        let mut tokens = line.split_whitespace();
        let mnemonic = tokens.next().ok_or(ParseErrorKind::UnknownMnemonic)?;
        let opcode = self
            .instruction_set
            .opcode(mnemonic)
            .ok_or(ParseErrorKind::UnknownMnemonic)?;

        let expected = opcode.operand_count();
        let found = tokens.clone().count();
        if found != expected {
            return Err(ParseErrorKind::ArityMismatch { expected, found });
        }

        // Arity was checked above, missing tokens can not happen.
        let first = tokens.next().unwrap_or_default();
        let second = tokens.next().unwrap_or_default();

        let instruction = match opcode {
            Opcode::Set => Instruction::Set(parse_register(first)?, parse_operand(second)?),
            Opcode::Add => Instruction::Add(parse_register(first)?, parse_operand(second)?),
            Opcode::Sub => Instruction::Sub(parse_register(first)?, parse_operand(second)?),
            Opcode::Mul => Instruction::Mul(parse_register(first)?, parse_operand(second)?),
            Opcode::Mod => Instruction::Mod(parse_register(first)?, parse_operand(second)?),
            Opcode::Sound => Instruction::Sound(parse_operand(first)?),
            Opcode::Recover => Instruction::Recover(parse_operand(first)?),
            Opcode::JumpGreaterThanZero => {
                Instruction::JumpGreaterThanZero(parse_operand(first)?, parse_operand(second)?)
            }
            Opcode::JumpNotZero => {
                Instruction::JumpNotZero(parse_operand(first)?, parse_operand(second)?)
            }
            Opcode::Send => Instruction::Send(parse_operand(first)?),
            Opcode::Receive => Instruction::Receive(parse_register(first)?),
        };
        Ok(instruction)
    }
}

/// Parse a whole program.
pub fn parse_program<const PROGRAM_CAP: usize>(
    instruction_set: InstructionSet,
    text: &str,
) -> Result<Vec<Instruction, PROGRAM_CAP>, ParseError> {
    let mut parser = Parser::new(instruction_set);
    for line in text.lines() {
        parser.add_line(line)?;
    }
    Ok(parser.finish())
}

fn parse_register(token: &str) -> Result<Register, ParseErrorKind> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(name), None) if name.is_ascii_lowercase() => Ok(name),
        _ => Err(ParseErrorKind::InvalidRegister),
    }
}

fn parse_operand(token: &str) -> Result<Operand, ParseErrorKind> {
    match token.chars().next() {
        Some(first) if first.is_alphabetic() => parse_register(token).map(Operand::Register),
        _ => token
            .parse::<Word>()
            .map(Operand::Const)
            .map_err(|_| ParseErrorKind::InvalidNumber),
    }
}
