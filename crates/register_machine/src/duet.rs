//! Two copies of one program running side by side.
//!
//! Each copy owns its registers and an inbox. A `snd` in one copy queues
//! the value in the other copy's inbox and a `rcv` waits until its own
//! inbox has a value. Register `p` starts as the id of the copy, 0 or 1.
//!
//! The copies are stepped in turn on the calling thread. A copy runs until
//! it blocks or halts, then the other one gets to run. The pair is done
//! once a whole round passes where neither copy could make progress, which
//! covers both copies halting as well as both waiting on empty inboxes.

use crate::{
    HaltReason, Instruction, Machine, MachineError, NoObserver, Observer, Register, State, Step,
};

pub const PROGRAM_ID_REGISTER: Register = 'p';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStatus {
    /// Waiting on an empty inbox when the pair stopped.
    Blocked,
    Halted(HaltReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuetOutcome {
    /// Values sent by program 0 and program 1.
    pub sent: [u64; 2],
    pub status: [ProgramStatus; 2],
}

impl DuetOutcome {
    pub fn is_deadlock(&self) -> bool {
        self.status
            .iter()
            .all(|status| matches!(status, ProgramStatus::Blocked))
    }

    pub fn hit_step_limit(&self) -> bool {
        self.status
            .iter()
            .any(|status| matches!(status, ProgramStatus::Halted(HaltReason::StepLimitExceeded)))
    }
}

pub struct Duet<'p, const REGISTER_CAP: usize, const QUEUE_CAP: usize> {
    machines: [Machine<'p, REGISTER_CAP, QUEUE_CAP>; 2],
    rounds: u64,
}

impl<'p, const REGISTER_CAP: usize, const QUEUE_CAP: usize> Duet<'p, REGISTER_CAP, QUEUE_CAP> {
    pub fn new(program: &'p [Instruction]) -> Result<Self, MachineError> {
        let mut zero = Machine::new(program);
        zero.set_register(PROGRAM_ID_REGISTER, 0)?;
        let mut one = Machine::new(program);
        one.set_register(PROGRAM_ID_REGISTER, 1)?;
        Ok(Self {
            machines: [zero, one],
            rounds: 0,
        })
    }

    /// Applies the same limit to both programs.
    pub fn with_step_limit(self, step_limit: u64) -> Self {
        let [zero, one] = self.machines;
        Self {
            machines: [zero.with_step_limit(step_limit), one.with_step_limit(step_limit)],
            rounds: self.rounds,
        }
    }

    pub fn program(&self, id: usize) -> Option<&Machine<'p, REGISTER_CAP, QUEUE_CAP>> {
        self.machines.get(id)
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn run(&mut self) -> Result<DuetOutcome, MachineError> {
        self.run_with(&mut NoObserver, &mut NoObserver)
    }

    pub fn run_with<A, B>(
        &mut self,
        first: &mut A,
        second: &mut B,
    ) -> Result<DuetOutcome, MachineError>
    where
        A: Observer<REGISTER_CAP>,
        B: Observer<REGISTER_CAP>,
    {
        loop {
            let [zero, one] = &mut self.machines;
            let zero_ran = run_until_waiting(zero, one, first)?;
            let one_ran = run_until_waiting(one, zero, second)?;
            self.rounds = self.rounds.saturating_add(1);
            log::trace!(
                "duet round {}: program 0 ran {}, program 1 ran {}",
                self.rounds,
                zero_ran,
                one_ran
            );
            if !zero_ran && !one_ran {
                break;
            }
        }

        let outcome = self.outcome();
        log::debug!(
            "duet finished after {} rounds, sent {:?}, status {:?}",
            self.rounds,
            outcome.sent,
            outcome.status
        );
        Ok(outcome)
    }

    pub fn outcome(&self) -> DuetOutcome {
        let [zero, one] = &self.machines;
        DuetOutcome {
            sent: [zero.sent(), one.sent()],
            status: [status(zero), status(one)],
        }
    }
}

/// Steps `machine` until it blocks or halts, handing every sent value to
/// `peer`. Returns whether at least one instruction was applied.
fn run_until_waiting<const REGISTER_CAP: usize, const QUEUE_CAP: usize, O>(
    machine: &mut Machine<'_, REGISTER_CAP, QUEUE_CAP>,
    peer: &mut Machine<'_, REGISTER_CAP, QUEUE_CAP>,
    observer: &mut O,
) -> Result<bool, MachineError>
where
    O: Observer<REGISTER_CAP>,
{
    let mut progressed = false;
    loop {
        match machine.step(observer)? {
            Step::Continue => {
                progressed = true;
                while let Some(value) = machine.take_sent() {
                    peer.deliver(value)?;
                }
            }
            Step::Blocked | Step::Halted(_) => return Ok(progressed),
        }
    }
}

fn status<const REGISTER_CAP: usize, const QUEUE_CAP: usize>(
    machine: &Machine<'_, REGISTER_CAP, QUEUE_CAP>,
) -> ProgramStatus {
    match machine.state() {
        State::Halted(reason) => ProgramStatus::Halted(reason),
        State::Running => ProgramStatus::Blocked,
    }
}
