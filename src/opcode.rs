//! Instruction set for TPG programs.
//!
//! Each instruction is four bytes: opcode, operand, operand, output register.
//! The opcode byte is reduced modulo the number of enabled operations, so the
//! same instruction bytes decode differently depending on whether the random
//! opcode is switched on.

use rand::Rng;

/// Operations a program instruction can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`, or 0 when `|b|` is too small to divide by.
    Div,
    /// `sin(a) + cos(b)`
    SinCos,
    /// 1 if `a > b` else 0.
    Greater,
    /// `-a` (ignores `b`).
    Negate,
    /// Uniform sample between `a` and `b`.
    Random,
}

impl Opcode {
    /// Operations available when the random opcode is disabled.
    pub const DETERMINISTIC: [Self; 7] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::SinCos,
        Self::Greater,
        Self::Negate,
    ];

    /// Threshold below which a divisor counts as zero.
    pub const DIV_EPSILON: f64 = f64::MIN_POSITIVE * 2.0;

    /// Number of decodable operations.
    #[inline]
    #[must_use]
    pub const fn count(allow_random: bool) -> usize {
        if allow_random {
            8
        } else {
            7
        }
    }

    /// Decode an instruction byte.
    #[inline]
    #[must_use]
    pub fn decode(code: u8, allow_random: bool) -> Self {
        match usize::from(code) % Self::count(allow_random) {
            7 => Self::Random,
            i => Self::DETERMINISTIC[i],
        }
    }

    /// Apply this operation to two operands.
    ///
    /// Only [`Opcode::Random`] touches `rng`; every other operation is a pure
    /// function of its operands.
    #[inline]
    pub fn apply<R: Rng>(self, a: f64, b: f64, rng: &mut R) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => {
                if b.abs() < Self::DIV_EPSILON {
                    0.0
                } else {
                    a / b
                }
            }
            Self::SinCos => a.sin() + b.cos(),
            Self::Greater => {
                if a > b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Negate => -a,
            Self::Random => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                // Interpolate rather than `random_range` so non-finite operands
                // propagate instead of panicking.
                lo + (hi - lo) * rng.random::<f64>()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_decode_wraps() {
        assert_eq!(Opcode::decode(0, false), Opcode::Add);
        assert_eq!(Opcode::decode(7, false), Opcode::Add);
        assert_eq!(Opcode::decode(7, true), Opcode::Random);
        assert_eq!(Opcode::decode(255, false), Opcode::Div); // 255 % 7 == 3
        assert_eq!(Opcode::decode(255, true), Opcode::Random); // 255 % 8 == 7
    }

    #[test]
    fn test_arithmetic() {
        let mut rng = rng();
        assert!((Opcode::Add.apply(1.5, 2.0, &mut rng) - 3.5).abs() < 1e-12);
        assert!((Opcode::Sub.apply(1.5, 2.0, &mut rng) + 0.5).abs() < 1e-12);
        assert!((Opcode::Mul.apply(1.5, 2.0, &mut rng) - 3.0).abs() < 1e-12);
        assert!((Opcode::Div.apply(1.5, 2.0, &mut rng) - 0.75).abs() < 1e-12);
        assert!((Opcode::Negate.apply(1.5, 99.0, &mut rng) + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_protected_divide() {
        let mut rng = rng();
        assert_eq!(Opcode::Div.apply(5.0, 0.0, &mut rng), 0.0);
        assert_eq!(Opcode::Div.apply(5.0, -0.0, &mut rng), 0.0);
        assert_eq!(Opcode::Div.apply(5.0, f64::MIN_POSITIVE, &mut rng), 0.0);
        assert!((Opcode::Div.apply(1.0, -2.0, &mut rng) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sincos_and_greater() {
        let mut rng = rng();
        assert!((Opcode::SinCos.apply(0.0, 0.0, &mut rng) - 1.0).abs() < 1e-12);
        assert_eq!(Opcode::Greater.apply(2.0, 1.0, &mut rng), 1.0);
        assert_eq!(Opcode::Greater.apply(1.0, 1.0, &mut rng), 0.0);
    }

    #[test]
    fn test_random_in_range() {
        let mut rng = rng();
        for _ in 0..100 {
            let v = Opcode::Random.apply(3.0, -1.0, &mut rng);
            assert!((-1.0..=3.0).contains(&v), "out of range: {}", v);
        }
        assert_eq!(Opcode::Random.apply(2.0, 2.0, &mut rng), 2.0);
    }
}
