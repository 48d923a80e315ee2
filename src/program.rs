//! Programs: the bidding units of a tangled program graph.
//!
//! A [`Program`] is a short register-machine listing. Evaluating it against
//! the current input and hidden vectors yields a scalar bid; the program with
//! the highest bid inside a [`Node`](crate::node::Node) decides where the
//! policy goes next, according to its [`Action`].
//!
//! Programs live in the [`GraphStore`](crate::store::GraphStore) arena. Any
//! operation that changes an [`Action::Node`] target also changes a parent
//! count, so those operations are methods of the store rather than of the
//! program itself.

use rand::Rng;

use crate::config::ProgramConfig;
use crate::opcode::Opcode;
use crate::store::NodeId;

/// Bytes per instruction: opcode, operand, operand, output register.
pub const CODES_PER_INSTRUCTION: usize = 4;

/// What a program does when it wins its node's auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Terminal decision. Both fields are bit vectors, least significant bit
    /// first: `outputs` becomes the policy's outputs and `hidden` its next
    /// hidden state.
    Atomic {
        /// Bit-encoded output values.
        outputs: u64,
        /// Bit-encoded next hidden state.
        hidden: u64,
    },
    /// Continue the decision at another node.
    Node(NodeId),
}

impl Action {
    /// A uniformly random atomic action for the given vector sizes.
    pub fn random_atomic<R: Rng>(output_count: usize, hidden_count: usize, rng: &mut R) -> Self {
        Self::Atomic {
            outputs: rng.random_range(0..bit_range(output_count)),
            hidden: rng.random_range(0..bit_range(hidden_count)),
        }
    }

    /// Target node, if this action links to one.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            Self::Atomic { .. } => None,
        }
    }

    /// Numeric action type as written by serialization (0 atomic, 1 node).
    #[inline]
    #[must_use]
    pub const fn type_code(&self) -> u8 {
        match self {
            Self::Atomic { .. } => 0,
            Self::Node(_) => 1,
        }
    }
}

/// `2^bits`, the exclusive upper bound for a `bits`-wide atomic target.
#[inline]
#[must_use]
pub fn bit_range(bits: usize) -> u64 {
    1u64.checked_shl(bits as u32).unwrap_or(u64::MAX)
}

/// A bidding program.
#[derive(Debug, Clone)]
pub struct Program {
    /// Monotonic identity assigned by the store on insertion.
    pub id: u64,
    /// Instruction bytes, [`CODES_PER_INSTRUCTION`] per instruction.
    pub instructions: Vec<u8>,
    /// Initial values of the writable registers.
    pub registers: Vec<f64>,
    /// Whether opcode bytes decode to 8 operations instead of 7.
    pub allow_random_op: bool,
    /// Output vector width used when re-rolling an atomic action.
    pub output_count: usize,
    /// Hidden vector width used when re-rolling an atomic action.
    pub hidden_count: usize,
    pub(crate) action: Action,
    pub(crate) parent_count: u32,
}

impl Program {
    /// Build a program with random code, random presets in `[0, 1)` and a
    /// random atomic action.
    pub fn random<R: Rng>(
        config: &ProgramConfig,
        output_count: usize,
        hidden_count: usize,
        rng: &mut R,
    ) -> Self {
        let instructions = (0..config.num_instructions * CODES_PER_INSTRUCTION)
            .map(|_| rng.random::<u8>())
            .collect();
        let registers = (0..config.registers_size)
            .map(|_| rng.random::<f64>())
            .collect();
        Self {
            id: 0,
            instructions,
            registers,
            allow_random_op: config.allow_random_op,
            output_count,
            hidden_count,
            action: Action::random_atomic(output_count, hidden_count, rng),
            parent_count: 0,
        }
    }

    /// Build a program from explicit parts.
    ///
    /// `instructions` should hold a whole number of instructions. Vector
    /// widths for later action re-rolls default to 0; set the public fields
    /// if the program will be mutated.
    ///
    /// # Panics
    ///
    /// Panics if `registers` is empty: results are written to the preset
    /// region, so it needs at least one slot.
    #[must_use]
    pub fn from_parts(instructions: Vec<u8>, registers: Vec<f64>, action: Action) -> Self {
        assert!(!registers.is_empty(), "a program needs at least one register preset");
        Self {
            id: 0,
            instructions,
            registers,
            allow_random_op: false,
            output_count: 0,
            hidden_count: 0,
            action,
            parent_count: 0,
        }
    }

    /// The action taken when this program wins.
    #[inline]
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Number of node slots that reference this program.
    #[inline]
    #[must_use]
    pub const fn parent_count(&self) -> u32 {
        self.parent_count
    }

    /// Number of complete instructions.
    #[inline]
    #[must_use]
    pub fn num_instructions(&self) -> usize {
        self.instructions.len() / CODES_PER_INSTRUCTION
    }

    /// Compute this program's bid.
    ///
    /// The register file is `registers ++ inputs ++ hidden`. Operands may read
    /// anywhere in it; results are written only to the preset region. The bid
    /// is the register named by the final instruction byte.
    ///
    /// # Panics
    ///
    /// Panics if `registers` has been emptied through the public field.
    pub fn evaluate<R: Rng>(&self, inputs: &[f64], hidden: &[f64], rng: &mut R) -> f64 {
        let preset_len = self.registers.len();
        let mut file = Vec::with_capacity(preset_len + inputs.len() + hidden.len());
        file.extend_from_slice(&self.registers);
        file.extend_from_slice(inputs);
        file.extend_from_slice(hidden);
        let file_len = file.len();

        for code in self.instructions.chunks_exact(CODES_PER_INSTRUCTION) {
            let a = file[usize::from(code[1]) % file_len];
            let b = file[usize::from(code[2]) % file_len];
            let out = usize::from(code[3]) % preset_len;
            file[out] = Opcode::decode(code[0], self.allow_random_op).apply(a, b, rng);
        }

        match self.instructions.last() {
            Some(&last) => file[usize::from(last) % preset_len],
            None => file[0],
        }
    }

    /// Rewrite one random instruction byte.
    pub(crate) fn mutate_instruction<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.instructions.is_empty() {
            return false;
        }
        let i = rng.random_range(0..self.instructions.len());
        self.instructions[i] = rng.random::<u8>();
        true
    }

    /// Rewrite one random register preset.
    pub(crate) fn mutate_register<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.registers.is_empty() {
            return false;
        }
        let i = rng.random_range(0..self.registers.len());
        self.registers[i] = rng.random::<f64>();
        true
    }

    /// Copy of this program's code and action with a fresh, unreferenced identity.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            id: 0,
            parent_count: 0,
            ..self.clone()
        }
    }
}
