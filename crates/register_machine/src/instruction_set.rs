use crate::Opcode;

/// Maps the mnemonics of one dialect to opcodes.
///
/// The same machine runs every dialect. What differs between them is which
/// mnemonics exist and which instruction a shared mnemonic such as `snd`
/// turns in to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionSet {
    name: &'static str,
    mnemonics: &'static [(&'static str, Opcode)],
}

impl InstructionSet {
    /// The sound card reading of the tablet: `snd` plays a sound and `rcv`
    /// stops with the last sound played.
    pub const SOUND: Self = Self::new(
        "sound",
        &[
            ("set", Opcode::Set),
            ("add", Opcode::Add),
            ("mul", Opcode::Mul),
            ("mod", Opcode::Mod),
            ("snd", Opcode::Sound),
            ("rcv", Opcode::Recover),
            ("jgz", Opcode::JumpGreaterThanZero),
        ],
    );

    /// Two programs running together: `snd` sends to the peer and `rcv`
    /// waits for a value from it.
    pub const DUET: Self = Self::new(
        "duet",
        &[
            ("set", Opcode::Set),
            ("add", Opcode::Add),
            ("mul", Opcode::Mul),
            ("mod", Opcode::Mod),
            ("snd", Opcode::Send),
            ("rcv", Opcode::Receive),
            ("jgz", Opcode::JumpGreaterThanZero),
        ],
    );

    pub const COPROCESSOR: Self = Self::new(
        "coprocessor",
        &[
            ("set", Opcode::Set),
            ("sub", Opcode::Sub),
            ("mul", Opcode::Mul),
            ("jnz", Opcode::JumpNotZero),
        ],
    );

    pub const fn new(name: &'static str, mnemonics: &'static [(&'static str, Opcode)]) -> Self {
        Self { name, mnemonics }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn opcode(&self, mnemonic: &str) -> Option<Opcode> {
        self.mnemonics
            .iter()
            .find(|(text, _)| *text == mnemonic)
            .map(|(_, opcode)| *opcode)
    }

    pub fn mnemonic(&self, opcode: Opcode) -> Option<&'static str> {
        self.mnemonics
            .iter()
            .find(|(_, candidate)| *candidate == opcode)
            .map(|(text, _)| *text)
    }

    pub fn contains(&self, opcode: Opcode) -> bool {
        self.mnemonic(opcode).is_some()
    }

    pub fn mnemonics(&self) -> impl Iterator<Item = &'static str> {
        self.mnemonics.iter().map(|(text, _)| *text)
    }
}
