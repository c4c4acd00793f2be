use crate::{Instruction, Opcode, Registers, Word};

/// Called once for every instruction the machine applies, after its effect
/// and before the machine checks whether to stop. Observers only get shared
/// views of the machine and can not change how it runs.
pub trait Observer<const REGISTER_CAP: usize> {
    fn observe(
        &mut self,
        instruction: &Instruction,
        registers: &Registers<REGISTER_CAP>,
        pc: Word,
    );
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl<const REGISTER_CAP: usize> Observer<REGISTER_CAP> for NoObserver {
    fn observe(
        &mut self,
        _instruction: &Instruction,
        _registers: &Registers<REGISTER_CAP>,
        _pc: Word,
    ) {
    }
}

impl<F, const REGISTER_CAP: usize> Observer<REGISTER_CAP> for F
where
    F: FnMut(&Instruction, &Registers<REGISTER_CAP>, Word),
{
    fn observe(
        &mut self,
        instruction: &Instruction,
        registers: &Registers<REGISTER_CAP>,
        pc: Word,
    ) {
        self(instruction, registers, pc)
    }
}

/// Counts executed instructions per opcode.
#[derive(Debug, Clone, Default)]
pub struct OpcodeCounter {
    counts: [u64; Opcode::VARIANT_COUNT],
}

impl OpcodeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, opcode: Opcode) -> u64 {
        self.counts.get(opcode.index()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |total, count| total.saturating_add(*count))
    }
}

impl<const REGISTER_CAP: usize> Observer<REGISTER_CAP> for OpcodeCounter {
    fn observe(
        &mut self,
        instruction: &Instruction,
        _registers: &Registers<REGISTER_CAP>,
        _pc: Word,
    ) {
        if let Some(count) = self.counts.get_mut(instruction.opcode().index()) {
            *count = count.saturating_add(1);
        }
    }
}
