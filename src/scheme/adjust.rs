//! Level and depth reconciliation for binary operations.
//!
//! Before two ciphertexts are combined they must sit on the same level with
//! the same noise-scale degree and, in the flexible modes, the same scaling
//! factor. [`plan_levels_and_depth`] decides which operand to touch and the
//! ordered list of [`AdjustAction`]s that brings it in line; the scheme layer
//! then executes the plan.

use tracing::trace;

use crate::scheme::CryptoParameters;

/// One step applied to the operand being adjusted
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AdjustAction {
    /// Multiply by a real constant encoded at the operand's level
    /// (depth + 1, scale × `sf[level]`)
    ScaleMultiplyBy(f64),
    /// Rescale by this many primes
    RescaleBy(usize),
    /// Drop this many primes without scaling
    LevelReduceBy(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    First,
    Second,
}

/// Bookkeeping of one operand
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperandState {
    pub level: usize,
    pub depth: usize,
    pub num_towers: usize,
    pub scaling_factor: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdjustPlan {
    pub operand: Operand,
    pub actions: Vec<AdjustAction>,
    /// Scaling factor to stamp on the operand once the actions have run
    pub final_scaling_factor: Option<f64>,
}

/// Per-level scaling constants the planner reads
pub trait ScalingTable {
    fn scaling_factor_real(&self, level: usize) -> f64;
    fn scaling_factor_real_big(&self, level: usize) -> f64;
    fn mod_reduce_factor(&self, tower: usize) -> f64;
}

impl ScalingTable for CryptoParameters {
    fn scaling_factor_real(&self, level: usize) -> f64 {
        CryptoParameters::scaling_factor_real(self, level)
    }

    fn scaling_factor_real_big(&self, level: usize) -> f64 {
        CryptoParameters::scaling_factor_real_big(self, level)
    }

    fn mod_reduce_factor(&self, tower: usize) -> f64 {
        CryptoParameters::mod_reduce_factor(self, tower)
    }
}

/// Plan the adjustment of two operands; `None` when nothing has to change.
pub fn plan_levels_and_depth<T: ScalingTable + ?Sized>(
    table: &T,
    first: &OperandState,
    second: &OperandState,
) -> Option<AdjustPlan> {
    let plan = if first.level < second.level {
        Some(plan_lower(table, Operand::First, first, second))
    } else if first.level > second.level {
        Some(plan_lower(table, Operand::Second, second, first))
    } else if first.depth < second.depth {
        Some(AdjustPlan {
            operand: Operand::First,
            actions: vec![AdjustAction::ScaleMultiplyBy(1.0)],
            final_scaling_factor: None,
        })
    } else if second.depth < first.depth {
        Some(AdjustPlan {
            operand: Operand::Second,
            actions: vec![AdjustAction::ScaleMultiplyBy(1.0)],
            final_scaling_factor: None,
        })
    } else {
        None
    };
    trace!(?first, ?second, ?plan, "planned level/depth adjustment");
    plan
}

/// `lo` sits on the lower (less reduced) level and is the one adjusted.
fn plan_lower<T: ScalingTable + ?Sized>(
    table: &T,
    operand: Operand,
    lo: &OperandState,
    hi: &OperandState,
) -> AdjustPlan {
    use AdjustAction::*;

    let (l1, l2) = (lo.level, hi.level);
    let scf1 = lo.scaling_factor;
    let scf = table.scaling_factor_real(l1);
    let q1 = table.mod_reduce_factor(lo.num_towers - 1);
    let mut actions = Vec::with_capacity(4);
    let mut final_scaling_factor = Some(hi.scaling_factor);

    match (lo.depth, hi.depth) {
        (2, 2) => {
            actions.push(ScaleMultiplyBy(hi.scaling_factor / scf1 * q1 / scf));
            actions.push(RescaleBy(1));
            if l1 + 1 < l2 {
                actions.push(LevelReduceBy(l2 - l1 - 1));
            }
        }
        (2, _) if l1 + 1 == l2 => {
            actions.push(RescaleBy(1));
            final_scaling_factor = None;
        }
        (2, _) => {
            let scf2 = table.scaling_factor_real_big(l2 - 1);
            actions.push(ScaleMultiplyBy(scf2 / scf1 * q1 / scf));
            actions.push(RescaleBy(1));
            if l1 + 2 < l2 {
                actions.push(LevelReduceBy(l2 - l1 - 2));
            }
            actions.push(RescaleBy(1));
        }
        (_, 2) => {
            actions.push(ScaleMultiplyBy(hi.scaling_factor / scf1 / scf));
            actions.push(LevelReduceBy(l2 - l1));
        }
        _ => {
            let scf2 = table.scaling_factor_real_big(l2 - 1);
            actions.push(ScaleMultiplyBy(scf2 / scf1 / scf));
            if l1 + 1 < l2 {
                actions.push(LevelReduceBy(l2 - l1 - 1));
            }
            actions.push(RescaleBy(1));
        }
    }

    AdjustPlan {
        operand,
        actions,
        final_scaling_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    /// Fixed-scale table: every factor is `2^40`.
    struct Flat;

    impl ScalingTable for Flat {
        fn scaling_factor_real(&self, _level: usize) -> f64 {
            2f64.powi(40)
        }

        fn scaling_factor_real_big(&self, _level: usize) -> f64 {
            2f64.powi(80)
        }

        fn mod_reduce_factor(&self, _tower: usize) -> f64 {
            2f64.powi(40)
        }
    }

    const SIZE_Q: usize = 12;

    fn state(level: usize, depth: usize) -> OperandState {
        let sf = 2f64.powi(40 * depth as i32);
        OperandState {
            level,
            depth,
            num_towers: SIZE_Q - level,
            scaling_factor: sf,
        }
    }

    fn simulate(mut s: OperandState, actions: &[AdjustAction]) -> OperandState {
        for action in actions {
            match *action {
                AdjustAction::ScaleMultiplyBy(_) => {
                    s.scaling_factor *= Flat.scaling_factor_real(s.level);
                    s.depth += 1;
                }
                AdjustAction::RescaleBy(k) => {
                    for i in 0..k {
                        s.scaling_factor /= Flat.mod_reduce_factor(s.num_towers - 1 - i);
                    }
                    s.depth -= k;
                    s.level += k;
                    s.num_towers -= k;
                }
                AdjustAction::LevelReduceBy(k) => {
                    s.level += k;
                    s.num_towers -= k;
                }
            }
        }
        s
    }

    #[test]
    fn test_equal_states_need_nothing() {
        assert_eq!(plan_levels_and_depth(&Flat, &state(2, 1), &state(2, 1)), None);
    }

    #[test]
    fn test_equal_level_raises_lower_depth() {
        let plan = plan_levels_and_depth(&Flat, &state(3, 2), &state(3, 1)).unwrap();
        assert_eq!(plan.operand, Operand::Second);
        assert_eq!(plan.actions, vec![AdjustAction::ScaleMultiplyBy(1.0)]);
    }

    #[test]
    fn test_adjacent_depth_two_only_rescales() {
        let plan = plan_levels_and_depth(&Flat, &state(1, 2), &state(2, 1)).unwrap();
        assert_eq!(plan.operand, Operand::First);
        assert_eq!(plan.actions, vec![AdjustAction::RescaleBy(1)]);
        assert_eq!(plan.final_scaling_factor, None);
    }

    #[test]
    fn test_depth_one_pair_rows() {
        let plan = plan_levels_and_depth(&Flat, &state(5, 1), &state(1, 1)).unwrap();
        assert_eq!(plan.operand, Operand::Second);
        assert_eq!(
            plan.actions,
            vec![
                AdjustAction::ScaleMultiplyBy(1.0),
                AdjustAction::LevelReduceBy(3),
                AdjustAction::RescaleBy(1),
            ]
        );
    }

    #[quickcheck]
    fn prop_plan_converges(l1: u8, l2: u8, d1: bool, d2: bool) -> bool {
        let a = state(l1 as usize % 8, if d1 { 2 } else { 1 });
        let b = state(l2 as usize % 8, if d2 { 2 } else { 1 });
        let Some(plan) = plan_levels_and_depth(&Flat, &a, &b) else {
            return a.level == b.level && a.depth == b.depth;
        };
        let (moved, other) = match plan.operand {
            Operand::First => (simulate(a, &plan.actions), b),
            Operand::Second => (simulate(b, &plan.actions), a),
        };
        moved.level == other.level && moved.depth == other.depth && moved.num_towers == other.num_towers
    }
}
