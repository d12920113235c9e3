//! Static overload resolution
//!
//! Given the candidate routines of a call site and the masks of its
//! arguments, pick the candidate the runtime would call, or report that the
//! choice cannot be made statically. Resolution is a pure function of its
//! inputs; registering dependencies is left to the caller.

use crate::symbols::{Name, RoutineId, RoutineSymbol, SymbolOracle, Visibility};
use crate::types::{TypeRef, TypeRefContext, TypeRefMask};
use smallvec::SmallVec;
use tracing::trace;

/// Cost of passing an argument to a parameter, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConversionCost {
    Pass,
    /// `long` to `double`
    ImplicitWidening,
    /// Scalar juggling or a run-time checked narrowing
    ImplicitCast,
    /// Boxing a typed value into an untyped parameter
    Wrap,
    Incompatible,
}

/// Static facts about one argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgumentInfo {
    pub mask: TypeRefMask,
    pub unpack: bool,
}

impl ArgumentInfo {
    pub fn new(mask: TypeRefMask) -> Self {
        Self { mask, unpack: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Resolved(RoutineId),
    Ambiguous(SmallVec<[RoutineId; 2]>),
    /// No candidate applies, or the arguments cannot be mapped statically
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Score {
    worst: ConversionCost,
    conversions: usize,
}

/// Pick the best candidate for `args`
///
/// `scope` is the class the call appears in, used for visibility checks.
pub fn resolve(
    types: &mut TypeRefContext,
    oracle: &dyn SymbolOracle,
    candidates: &[&RoutineSymbol],
    args: &[ArgumentInfo],
    scope: Option<&Name>,
) -> Binding {
    if candidates.is_empty() || args.iter().any(|a| a.unpack) {
        return Binding::Missing;
    }

    let visible: Vec<&RoutineSymbol> = candidates
        .iter()
        .copied()
        .filter(|c| is_visible(oracle, c, scope))
        .collect();

    let accepts = |c: &&RoutineSymbol| args.len() >= c.mandatory_count() && args.len() <= c.fixed_count();
    let mut applicable: Vec<&RoutineSymbol> = visible.iter().copied().filter(|c| !c.is_variadic()).filter(accepts).collect();
    if applicable.is_empty() {
        applicable = visible
            .iter()
            .copied()
            .filter(|c| c.is_variadic() && args.len() >= c.mandatory_count())
            .collect();
    }

    let mut scored: Vec<(Score, &RoutineSymbol)> = applicable
        .into_iter()
        .map(|c| (score(types, oracle, c, args), c))
        .filter(|(s, _)| s.worst != ConversionCost::Incompatible)
        .collect();
    let Some(best) = scored.iter().map(|(s, _)| *s).min() else {
        return Binding::Missing;
    };
    scored.retain(|(s, _)| *s == best);

    let tied: Vec<&RoutineSymbol> = scored.into_iter().map(|(_, c)| c).collect();
    if let [only] = tied.as_slice() {
        return Binding::Resolved(only.id);
    }
    if let Some(derived) = most_derived(oracle, &tied) {
        return Binding::Resolved(derived.id);
    }
    trace!(candidates = tied.len(), "ambiguous overload");
    Binding::Ambiguous(tied.iter().map(|c| c.id).collect())
}

fn is_visible(oracle: &dyn SymbolOracle, candidate: &RoutineSymbol, scope: Option<&Name>) -> bool {
    let Some(declaring) = &candidate.class else {
        return true;
    };
    match candidate.visibility {
        Visibility::Public => true,
        Visibility::Private => scope == Some(declaring),
        Visibility::Protected => scope.is_some_and(|s| oracle.is_subclass_of(s, declaring) || oracle.is_subclass_of(declaring, s)),
    }
}

fn score(types: &mut TypeRefContext, oracle: &dyn SymbolOracle, candidate: &RoutineSymbol, args: &[ArgumentInfo]) -> Score {
    let mut worst = ConversionCost::Pass;
    let mut conversions = 0;
    for (position, arg) in args.iter().enumerate() {
        let cost = match candidate.param_for_argument(position) {
            Some(param) => {
                let accepted = match &param.hint {
                    Some(hint) => Some(types.type_hint_mask(hint)),
                    None => None,
                };
                let accepted = accepted.map(|mask| {
                    if param.default_null {
                        mask | types.get_null_type_mask()
                    } else {
                        mask
                    }
                });
                conversion_cost(types, oracle, arg.mask, accepted)
            }
            None => ConversionCost::Incompatible,
        };
        if cost != ConversionCost::Pass {
            conversions += 1;
        }
        worst = worst.max(cost);
    }
    Score { worst, conversions }
}

/// Cost of passing a value of `arg` to a parameter accepting `param`
/// (`None` for untyped parameters)
pub fn conversion_cost(
    types: &TypeRefContext,
    oracle: &dyn SymbolOracle,
    arg: TypeRefMask,
    param: Option<TypeRefMask>,
) -> ConversionCost {
    let param = match param {
        Some(mask) if !mask.is_any() => mask,
        _ => {
            return if arg.is_any() {
                ConversionCost::Pass
            } else {
                ConversionCost::Wrap
            }
        }
    };
    if arg.is_any() {
        return ConversionCost::ImplicitCast;
    }
    arg.types()
        .map(|index| match types.type_ref(index) {
            Some(ty) => type_cost(types, oracle, ty, index, param),
            None => ConversionCost::Incompatible,
        })
        .max()
        .unwrap_or(ConversionCost::Pass)
}

fn type_cost(
    types: &TypeRefContext,
    oracle: &dyn SymbolOracle,
    ty: &TypeRef,
    index: usize,
    param: TypeRefMask,
) -> ConversionCost {
    if param.has_type(index) {
        return ConversionCost::Pass;
    }
    let accepts = |pred: &dyn Fn(&TypeRef) -> bool| {
        param
            .types()
            .any(|i| types.type_ref(i).is_some_and(pred))
    };
    let is_scalar = |t: &TypeRef| matches!(t, TypeRef::Bool | TypeRef::Long | TypeRef::Double | TypeRef::String);
    match ty {
        TypeRef::Array { .. } if accepts(&|t: &TypeRef| t.is_array()) => ConversionCost::Pass,
        TypeRef::Class { name } => {
            let related = accepts(&|t: &TypeRef| match t {
                TypeRef::Class { name: target } => oracle.is_subclass_of(name, target),
                _ => false,
            });
            if related {
                ConversionCost::Pass
            } else {
                ConversionCost::Incompatible
            }
        }
        TypeRef::Long if accepts(&|t: &TypeRef| matches!(t, TypeRef::Double)) => ConversionCost::ImplicitWidening,
        t if is_scalar(t) && accepts(&is_scalar) => ConversionCost::ImplicitCast,
        _ => ConversionCost::Incompatible,
    }
}

/// The candidate whose declaring class derives from every other candidate's
fn most_derived<'a>(oracle: &dyn SymbolOracle, tied: &[&'a RoutineSymbol]) -> Option<&'a RoutineSymbol> {
    tied.iter().copied().find(|candidate| {
        let Some(class) = &candidate.class else {
            return false;
        };
        tied.iter().all(|other| {
            other.id == candidate.id
                || other
                    .class
                    .as_ref()
                    .is_some_and(|base| base != class && oracle.is_subclass_of(class, base))
        })
    })
}
