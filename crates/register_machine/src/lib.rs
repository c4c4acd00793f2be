#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! A small register machine.
//!
//! A program is a slice of [`Instruction`]s produced by the [`parser`]
//! from text such as:
//!
//! ```text
//! set a 1
//! add a 2
//! jgz a -1
//! ```
//!
//! Registers are single lowercase letters holding signed 64 bit values and read
//! as zero until they are first written. The program counter is signed
//! so that a jump may move it off either end of the program, which is
//! how most programs terminate.
//!
//! Which mnemonics exist, and what `snd` and `rcv` mean, depends on the
//! [`InstructionSet`] the program was parsed with. The machine itself only
//! knows the closed set of [`Instruction`] variants.
//!
//! All storage is fixed size. `REGISTER_CAP` bounds the number of distinct
//! registers a program may write and `QUEUE_CAP` bounds the inbox and
//! outbox used by the paired [`duet`] mode.

use heapless::{Deque, LinearMap};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;
use variant_count::VariantCount;

pub mod duet;
pub mod instruction_set;
pub mod observer;
pub mod parser;


pub use instruction_set::InstructionSet;
pub use observer::{NoObserver, Observer, OpcodeCounter};
pub use parser::{ParseError, ParseErrorKind, Parser, parse_program};

/// Register values and jump offsets.
pub type Word = i64;

/// Registers are named by a single lowercase ASCII letter.
pub type Register = char;

/// One slot for every register name the parser accepts.
pub const DEFAULT_REGISTER_CAP: usize = 26;
pub const DEFAULT_QUEUE_CAP: usize = 256;
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

pub type DefaultMachine<'p> = Machine<'p, DEFAULT_REGISTER_CAP, DEFAULT_QUEUE_CAP>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineError {
    #[error("modulo by zero at pc {0}")]
    DivisionByZero(Word),
    #[error("register file is full, can not store register {0}")]
    RegisterFileFull(Register),
    #[error("attempted send or receive would overflow the queue")]
    QueueFull,
    #[error("receive at pc {0} on an empty inbox with no sender")]
    EmptyInbox(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Const(Word),
    Register(Register),
}

impl Operand {
    pub fn resolve<const REGISTER_CAP: usize>(&self, registers: &Registers<REGISTER_CAP>) -> Word {
        match self {
            Operand::Const(value) => *value,
            Operand::Register(name) => registers.get(*name),
        }
    }
}

/// Fieldless mirror of [`Instruction`], used by the mnemonic tables and
/// the per opcode counters.
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    Set,
    Add,
    Sub,
    Mul,
    Mod,
    Sound,
    Recover,
    JumpGreaterThanZero,
    JumpNotZero,
    Send,
    Receive,
}

impl Opcode {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Set
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Mod
            | Opcode::JumpGreaterThanZero
            | Opcode::JumpNotZero => 2,
            Opcode::Sound | Opcode::Recover | Opcode::Send | Opcode::Receive => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Set(Register, Operand),
    Add(Register, Operand),
    Sub(Register, Operand),
    Mul(Register, Operand),
    Mod(Register, Operand),
    /// Remember the value as the last sound played.
    Sound(Operand),
    /// Stop with the last sound played when the operand is not zero.
    Recover(Operand),
    JumpGreaterThanZero(Operand, Operand),
    JumpNotZero(Operand, Operand),
    /// Queue the value for the peer program.
    Send(Operand),
    /// Take the next value from the inbox, waiting when it is empty.
    Receive(Register),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Set(..) => Opcode::Set,
            Instruction::Add(..) => Opcode::Add,
            Instruction::Sub(..) => Opcode::Sub,
            Instruction::Mul(..) => Opcode::Mul,
            Instruction::Mod(..) => Opcode::Mod,
            Instruction::Sound(_) => Opcode::Sound,
            Instruction::Recover(_) => Opcode::Recover,
            Instruction::JumpGreaterThanZero(..) => Opcode::JumpGreaterThanZero,
            Instruction::JumpNotZero(..) => Opcode::JumpNotZero,
            Instruction::Send(_) => Opcode::Send,
            Instruction::Receive(_) => Opcode::Receive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registers<const REGISTER_CAP: usize> {
    values: LinearMap<Register, Word, REGISTER_CAP>,
}

impl<const REGISTER_CAP: usize> Registers<REGISTER_CAP> {
    pub fn new() -> Self {
        Self {
            values: LinearMap::new(),
        }
    }

    /// Unset registers read as zero.
    pub fn get(&self, name: Register) -> Word {
        self.values.get(&name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: Register, value: Word) -> Result<(), MachineError> {
        self.values
            .insert(name, value)
            .map(|_| ())
            .map_err(|_| MachineError::RegisterFileFull(name))
    }

    pub fn contains(&self, name: Register) -> bool {
        self.values.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, Word)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }
}

impl<const REGISTER_CAP: usize> Default for Registers<REGISTER_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// The program counter left the program.
    OutOfBounds,
    /// An instruction asked the machine to stop.
    ExplicitStop,
    /// The machine executed `step_limit` instructions without halting.
    StepLimitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Halted(HaltReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// A receive found the inbox empty. Nothing was applied and the
    /// program counter did not move.
    Blocked,
    Halted(HaltReason),
}

enum Flow {
    Next,
    Jump(Word),
    Stop,
    Blocked,
}

pub struct Machine<'p, const REGISTER_CAP: usize, const QUEUE_CAP: usize> {
    program: &'p [Instruction],
    registers: Registers<REGISTER_CAP>,
    pc: Word,
    last_emitted: Option<Word>,
    recovered: Option<Word>,
    sent: u64,
    inbox: Deque<Word, QUEUE_CAP>,
    outbox: Deque<Word, QUEUE_CAP>,
    state: State,
    steps: u64,
    step_limit: u64,
}

impl<'p, const REGISTER_CAP: usize, const QUEUE_CAP: usize> Machine<'p, REGISTER_CAP, QUEUE_CAP> {
    pub fn new(program: &'p [Instruction]) -> Self {
        Self {
            program,
            registers: Registers::new(),
            pc: 0,
            last_emitted: None,
            recovered: None,
            sent: 0,
            inbox: Deque::new(),
            outbox: Deque::new(),
            state: State::Running,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn set_register(&mut self, name: Register, value: Word) -> Result<(), MachineError> {
        self.registers.set(name, value)
    }

    pub fn registers(&self) -> &Registers<REGISTER_CAP> {
        &self.registers
    }

    pub fn register(&self, name: Register) -> Word {
        self.registers.get(name)
    }

    pub fn program(&self) -> &'p [Instruction] {
        self.program
    }

    pub fn pc(&self) -> Word {
        self.pc
    }

    /// The last value played by `Sound`.
    pub fn last_emitted(&self) -> Option<Word> {
        self.last_emitted
    }

    /// The value recovered by the `Recover` that stopped the machine.
    /// A `Recover` that runs before any `Sound` still stops the machine but
    /// leaves this as `None` rather than reporting a sound of 0.
    pub fn recovered(&self) -> Option<Word> {
        self.recovered
    }

    /// How many times `Send` was executed.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn step_limit(&self) -> u64 {
        self.step_limit
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, State::Halted(_))
    }

    /// Queue a value for the next `Receive`.
    pub fn deliver(&mut self, value: Word) -> Result<(), MachineError> {
        self.inbox
            .push_back(value)
            .map_err(|_| MachineError::QueueFull)
    }

    /// Take the oldest value queued by `Send`.
    pub fn take_sent(&mut self) -> Option<Word> {
        self.outbox.pop_front()
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn run(&mut self) -> Result<HaltReason, MachineError> {
        self.run_with(&mut NoObserver)
    }

    /// Run until the machine halts. A machine running alone has nobody to
    /// fill its inbox, so blocking on a receive is an error here.
    pub fn run_with<O: Observer<REGISTER_CAP>>(
        &mut self,
        observer: &mut O,
    ) -> Result<HaltReason, MachineError> {
        match self.resume_with(observer)? {
            Step::Halted(reason) => Ok(reason),
            Step::Blocked | Step::Continue => Err(MachineError::EmptyInbox(self.pc)),
        }
    }

    /// Run until the machine halts or blocks on an empty inbox.
    pub fn resume_with<O: Observer<REGISTER_CAP>>(
        &mut self,
        observer: &mut O,
    ) -> Result<Step, MachineError> {
        loop {
            match self.step(observer)? {
                Step::Continue => {}
                other => return Ok(other),
            }
        }
    }

    pub fn step<O: Observer<REGISTER_CAP>>(
        &mut self,
        observer: &mut O,
    ) -> Result<Step, MachineError> {
        if let State::Halted(reason) = self.state {
            return Ok(Step::Halted(reason));
        }

        let pc = self.pc;
        let program = self.program;
        let Some(instruction) = usize::try_from(pc).ok().and_then(|index| program.get(index)) else {
            return Ok(self.halt(HaltReason::OutOfBounds));
        };

        if self.steps >= self.step_limit {
            return Ok(self.halt(HaltReason::StepLimitExceeded));
        }

        let flow = self.apply(instruction, pc)?;
        if matches!(flow, Flow::Blocked) {
            return Ok(Step::Blocked);
        }

        self.steps = self.steps.saturating_add(1);
        observer.observe(instruction, &self.registers, pc);

        match flow {
            Flow::Stop => return Ok(self.halt(HaltReason::ExplicitStop)),
            Flow::Jump(offset) => self.pc = pc.saturating_add(offset),
            Flow::Next | Flow::Blocked => self.pc = pc.saturating_add(1),
        }
        Ok(Step::Continue)
    }

    fn apply(&mut self, instruction: &Instruction, pc: Word) -> Result<Flow, MachineError> {
        match *instruction {
            Instruction::Set(target, operand) => {
                let value = operand.resolve(&self.registers);
                self.registers.set(target, value)?;
                Ok(Flow::Next)
            }
            Instruction::Add(target, operand) => {
                self.update(target, operand, |lhs, rhs| Ok(lhs.wrapping_add(rhs)))
            }
            Instruction::Sub(target, operand) => {
                self.update(target, operand, |lhs, rhs| Ok(lhs.wrapping_sub(rhs)))
            }
            Instruction::Mul(target, operand) => {
                self.update(target, operand, |lhs, rhs| Ok(lhs.wrapping_mul(rhs)))
            }
            Instruction::Mod(target, operand) => self.update(target, operand, |lhs, rhs| {
                if rhs == 0 {
                    return Err(MachineError::DivisionByZero(pc));
                }
                Ok(lhs.wrapping_rem(rhs))
            }),
            Instruction::Sound(operand) => {
                self.last_emitted = Some(operand.resolve(&self.registers));
                Ok(Flow::Next)
            }
            Instruction::Recover(operand) => {
                if operand.resolve(&self.registers) == 0 {
                    return Ok(Flow::Next);
                }
                self.recovered = self.last_emitted;
                Ok(Flow::Stop)
            }
            Instruction::JumpGreaterThanZero(condition, offset) => {
                if condition.resolve(&self.registers) > 0 {
                    Ok(Flow::Jump(offset.resolve(&self.registers)))
                } else {
                    Ok(Flow::Jump(1))
                }
            }
            Instruction::JumpNotZero(condition, offset) => {
                if condition.resolve(&self.registers) != 0 {
                    Ok(Flow::Jump(offset.resolve(&self.registers)))
                } else {
                    Ok(Flow::Jump(1))
                }
            }
            Instruction::Send(operand) => {
                let value = operand.resolve(&self.registers);
                self.outbox
                    .push_back(value)
                    .map_err(|_| MachineError::QueueFull)?;
                self.sent = self.sent.saturating_add(1);
                Ok(Flow::Next)
            }
            Instruction::Receive(target) => {
                let Some(value) = self.inbox.pop_front() else {
                    return Ok(Flow::Blocked);
                };
                self.registers.set(target, value)?;
                Ok(Flow::Next)
            }
        }
    }

    fn update<F>(&mut self, target: Register, operand: Operand, op: F) -> Result<Flow, MachineError>
    where
        F: FnOnce(Word, Word) -> Result<Word, MachineError>,
    {
        let rhs = operand.resolve(&self.registers);
        let value = op(self.registers.get(target), rhs)?;
        self.registers.set(target, value)?;
        Ok(Flow::Next)
    }

    fn halt(&mut self, reason: HaltReason) -> Step {
        self.state = State::Halted(reason);
        match reason {
            HaltReason::StepLimitExceeded => log::warn!(
                "machine stopped at pc {} after reaching the step limit of {}",
                self.pc,
                self.step_limit
            ),
            _ => log::debug!(
                "machine halted ({:?}) at pc {} after {} steps",
                reason,
                self.pc,
                self.steps
            ),
        }
        Step::Halted(reason)
    }
}
