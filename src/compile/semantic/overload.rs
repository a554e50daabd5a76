//! Best-match overload selection by per-argument assignability distance.

use tracing::trace;

use crate::descriptor::{JvmType, OBJECT};

use super::convert::{box_type, unbox_type, widening_steps};
use super::types::{MethodSig, TypeRegistry};

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Found(MethodSig),
    /// Two or more candidates share the lowest score.
    Ambiguous(Vec<MethodSig>),
    NoMatch,
}

/// Cost of passing a `from` value where `to` is declared, `None` when not
/// statically applicable.
///
/// Exact match is 0, each primitive widening step or supertype edge adds 1,
/// and boxing or unboxing adds 1 before the rest of the conversion.
pub fn arg_distance(registry: &TypeRegistry, from: &JvmType, to: &JvmType) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    match (from, to) {
        (JvmType::Null, t) => t.is_reference().then_some(1),
        (f, t) if f.is_primitive() && t.is_primitive() => {
            if *f == JvmType::Boolean || *t == JvmType::Boolean {
                None
            } else {
                widening_steps(f, t)
            }
        }
        (f, JvmType::Reference(target)) if f.is_primitive() => {
            let wrapper = box_type(f)?;
            registry.super_distance(wrapper, target).map(|d| 1 + d)
        }
        (f, t) if t.is_primitive() => {
            let prim = unbox_type(f)?;
            widening_steps(&prim, t).map(|d| 1 + d)
        }
        (JvmType::Reference(a), JvmType::Reference(b)) => registry.super_distance(a, b),
        (JvmType::Array(_), JvmType::Reference(b)) => registry.assignable(from, to).then(|| u32::from(b != OBJECT) + 1),
        (JvmType::Array(a), JvmType::Array(b)) => {
            if a.is_primitive() || b.is_primitive() {
                None
            } else {
                arg_distance(registry, a, b)
            }
        }
        _ => None,
    }
}

/// Total distance of a call with `args` against `sig`.
pub fn score(registry: &TypeRegistry, sig: &MethodSig, args: &[JvmType]) -> Option<u32> {
    if sig.params.len() != args.len() {
        return None;
    }
    sig.params
        .iter()
        .zip(args)
        .map(|(param, arg)| arg_distance(registry, arg, param))
        .sum()
}

/// Pick the strictly cheapest candidate; a tie is ambiguous.
pub fn select(registry: &TypeRegistry, candidates: &[MethodSig], args: &[JvmType]) -> Selection {
    let scored: Vec<(u32, &MethodSig)> = candidates
        .iter()
        .filter_map(|c| score(registry, c, args).map(|s| (s, c)))
        .collect();
    let Some(best) = scored.iter().map(|(s, _)| *s).min() else {
        return Selection::NoMatch;
    };
    let mut winners: Vec<MethodSig> = scored
        .into_iter()
        .filter(|(s, _)| *s == best)
        .map(|(_, c)| c.clone())
        .collect();
    winners.dedup_by(|a, b| a.params == b.params && a.owner == b.owner);
    if winners.len() == 1 {
        let pick = winners.remove(0);
        trace!(method = %pick.display(), owner = %pick.owner, score = best, "overload selected");
        Selection::Found(pick)
    } else {
        trace!(candidates = winners.len(), score = best, "ambiguous overload");
        Selection::Ambiguous(winners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::BuiltinProvider;
    use crate::method_info::MethodAccessFlags;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(vec![Box::new(BuiltinProvider::new())])
    }

    fn sig(params: Vec<JvmType>) -> MethodSig {
        MethodSig::new("T", "method", params, JvmType::Void, MethodAccessFlags::PUBLIC)
    }

    #[test]
    fn exact_wrapper_beats_object() {
        let reg = registry();
        let integer = JvmType::reference("java/lang/Integer");
        let candidates = vec![sig(vec![JvmType::object()]), sig(vec![integer.clone()])];
        assert_eq!(select(&reg, &candidates, &[integer.clone()]), Selection::Found(candidates[1].clone()));
        // boxing an int reaches Integer before Object
        assert_eq!(select(&reg, &candidates, &[JvmType::Int]), Selection::Found(candidates[1].clone()));
    }

    #[test]
    fn equal_scores_are_ambiguous() {
        let reg = registry();
        let candidates = vec![
            sig(vec![JvmType::Int, JvmType::Long]),
            sig(vec![JvmType::Long, JvmType::Int]),
        ];
        match select(&reg, &candidates, &[JvmType::Int, JvmType::Int]) {
            Selection::Ambiguous(found) => assert_eq!(found.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn widening_prefers_the_nearest_primitive() {
        let reg = registry();
        let candidates = vec![sig(vec![JvmType::Double]), sig(vec![JvmType::Long])];
        assert_eq!(select(&reg, &candidates, &[JvmType::Int]), Selection::Found(candidates[1].clone()));
        assert_eq!(arg_distance(&reg, &JvmType::Byte, &JvmType::Int), Some(2));
        assert_eq!(arg_distance(&reg, &JvmType::Long, &JvmType::Int), None);
    }

    #[test]
    fn null_fits_any_reference() {
        let reg = registry();
        assert_eq!(arg_distance(&reg, &JvmType::Null, &JvmType::string()), Some(1));
        assert_eq!(arg_distance(&reg, &JvmType::Null, &JvmType::Int), None);
    }
}
