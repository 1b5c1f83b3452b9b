//! Memoized selectors
//!
//! A selector derives a value from `(state, params)`. [`create_selector`]
//! runs a set of input selectors on every call and only re-runs the result
//! function when one of the inputs differs from the previous call, where
//! "differs" is [`RefEq`]: pointer identity for `Arc`, value equality for
//! scalars and strings.
//!
//! The cache holds exactly one entry. Alternating between two argument sets
//! recomputes every time.

use crate::combine::{CombinedState, SliceState};
use crate::entity::{EntityId, EntityState};
use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Cheap equality used to decide whether memoized inputs changed.
pub trait RefEq {
    fn ref_eq(&self, other: &Self) -> bool;
}

impl<T: ?Sized> RefEq for Arc<T> {
    fn ref_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(self), Arc::as_ptr(other))
    }
}

impl<T: RefEq> RefEq for Option<T> {
    fn ref_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.ref_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: RefEq> RefEq for Vec<T> {
    fn ref_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.ref_eq(b))
    }
}

macro_rules! ref_eq_by_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl RefEq for $ty {
                fn ref_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )+
    };
}

ref_eq_by_value!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    String,
    &'static str
);

macro_rules! ref_eq_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: RefEq),+> RefEq for ($($name,)+) {
            fn ref_eq(&self, other: &Self) -> bool {
                $(self.$idx.ref_eq(&other.$idx))&&+
            }
        }
    };
}

ref_eq_tuple!(A 0);
ref_eq_tuple!(A 0, B 1);
ref_eq_tuple!(A 0, B 1, C 2);
ref_eq_tuple!(A 0, B 1, C 2, D 3);
ref_eq_tuple!(A 0, B 1, C 2, D 3, E 4);
ref_eq_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);

/// Derives a value from state and parameters.
///
/// Closures `Fn(&S, &P) -> T` are selectors; use `()` for `P` when there are
/// no parameters.
pub trait Selector<S, P = ()>: Send + Sync {
    type Output;

    fn select(&self, state: &S, params: &P) -> Self::Output;
}

impl<S, P, T, F> Selector<S, P> for F
where
    F: Fn(&S, &P) -> T + Send + Sync,
{
    type Output = T;

    fn select(&self, state: &S, params: &P) -> T {
        self(state, params)
    }
}

pub type BoxedSelector<S, P, T> = Box<dyn Selector<S, P, Output = T>>;

/// A group of input selectors evaluated together.
///
/// Implemented for tuples of one to six selectors and for a `Vec` of boxed
/// selectors sharing an output type.
pub trait InputSelectors<S, P>: Send + Sync {
    type Inputs: RefEq;

    fn select_inputs(&self, state: &S, params: &P) -> Self::Inputs;
}

macro_rules! input_selectors_tuple {
    ($($name:ident),+) => {
        impl<S, P, $($name),+> InputSelectors<S, P> for ($($name,)+)
        where
            $($name: Selector<S, P>, <$name as Selector<S, P>>::Output: RefEq,)+
        {
            type Inputs = ($(<$name as Selector<S, P>>::Output,)+);

            #[allow(non_snake_case)]
            fn select_inputs(&self, state: &S, params: &P) -> Self::Inputs {
                let ($($name,)+) = self;
                ($($name.select(state, params),)+)
            }
        }
    };
}

input_selectors_tuple!(A);
input_selectors_tuple!(A, B);
input_selectors_tuple!(A, B, C);
input_selectors_tuple!(A, B, C, D);
input_selectors_tuple!(A, B, C, D, E);
input_selectors_tuple!(A, B, C, D, E, F);

impl<S, P, T> InputSelectors<S, P> for Vec<BoxedSelector<S, P, T>>
where
    T: RefEq,
{
    type Inputs = Vec<T>;

    fn select_inputs(&self, state: &S, params: &P) -> Vec<T> {
        self.iter().map(|selector| selector.select(state, params)).collect()
    }
}

/// Selector returned by [`create_selector`].
pub struct MemoizedSelector<S, P, I, F, T>
where
    I: InputSelectors<S, P>,
{
    inputs: I,
    result: F,
    cache: Mutex<Option<(I::Inputs, T)>>,
    recomputations: AtomicUsize,
    _state: PhantomData<fn(&S, &P)>,
}

/// Build a memoized selector from input selectors and a result function.
///
/// ```rust
/// # use state_stack::{create_selector, Selector};
/// # use std::sync::Arc;
/// struct Root {
///     scores: Arc<Vec<u32>>,
/// }
///
/// let best = create_selector(
///     (|root: &Root, _: &()| Arc::clone(&root.scores),),
///     |(scores,): &(Arc<Vec<u32>>,)| scores.iter().copied().max(),
/// );
///
/// let root = Root { scores: Arc::new(vec![3, 9, 4]) };
/// assert_eq!(best.select(&root, &()), Some(9));
/// assert_eq!(best.select(&root, &()), Some(9));
/// assert_eq!(best.recomputations(), 1);
/// ```
pub fn create_selector<S, P, I, F, T>(inputs: I, result: F) -> MemoizedSelector<S, P, I, F, T>
where
    I: InputSelectors<S, P>,
    F: Fn(&I::Inputs) -> T,
{
    MemoizedSelector {
        inputs,
        result,
        cache: Mutex::new(None),
        recomputations: AtomicUsize::new(0),
        _state: PhantomData,
    }
}

impl<S, P, I, F, T> MemoizedSelector<S, P, I, F, T>
where
    I: InputSelectors<S, P>,
{
    /// How many times the result function ran.
    pub fn recomputations(&self) -> usize {
        self.recomputations.load(Ordering::Relaxed)
    }

    pub fn reset_recomputations(&self) {
        self.recomputations.store(0, Ordering::Relaxed);
    }

    /// Forget the cached result.
    pub fn clear_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<S, P, I, F, T> Selector<S, P> for MemoizedSelector<S, P, I, F, T>
where
    I: InputSelectors<S, P>,
    I::Inputs: Send,
    F: Fn(&I::Inputs) -> T + Send + Sync,
    T: Clone + Send,
{
    type Output = T;

    fn select(&self, state: &S, params: &P) -> T {
        let inputs = self.inputs.select_inputs(state, params);

        if let Some((cached_inputs, cached)) = &*self.cache.lock().unwrap_or_else(PoisonError::into_inner) {
            if cached_inputs.ref_eq(&inputs) {
                return cached.clone();
            }
        }

        let value = (self.result)(&inputs);
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some((inputs, value.clone()));
        value
    }
}

fn lookup_path(state: &CombinedState, path: &[String]) -> Option<SliceState> {
    let (last, parents) = path.split_last()?;
    let mut current: Option<Arc<CombinedState>> = None;
    for segment in parents {
        let parent = current.as_deref().unwrap_or(state);
        current = Some(parent.slice::<CombinedState>(segment)?);
    }
    current.as_deref().unwrap_or(state).raw(last).cloned()
}

/// Select a typed slice by path (`"quests"`, or `"game/quests"` for nested
/// combined state).
pub fn create_slice_selector<T>(
    path: &str,
) -> impl Selector<CombinedState, (), Output = Option<Arc<T>>>
where
    T: Any + Send + Sync,
{
    let path: Vec<String> = path
        .split(['/', '.'])
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    create_selector(
        (move |state: &CombinedState, _: &()| lookup_path(state, &path),),
        |(slice,): &(Option<SliceState>,)| slice.clone().and_then(|value| value.downcast::<T>().ok()),
    )
}

/// All entities of a normalized collection, in `ids` order.
pub fn create_entities_selector<S, P, E, Id, Sel>(
    select_state: Sel,
) -> impl Selector<S, P, Output = Arc<Vec<E>>>
where
    Sel: Selector<S, P, Output = Arc<EntityState<E, Id>>>,
    E: Clone + Send + Sync,
    Id: EntityId,
{
    create_selector((select_state,), |(collection,): &(Arc<EntityState<E, Id>>,)| {
        Arc::new(collection.all())
    })
}

/// Items of a list selector that satisfy a predicate.
pub fn create_filter_selector<S, P, E, Sel, Pred>(
    select_items: Sel,
    predicate: Pred,
) -> impl Selector<S, P, Output = Arc<Vec<E>>>
where
    Sel: Selector<S, P, Output = Arc<Vec<E>>>,
    E: Clone + Send + Sync,
    Pred: Fn(&E) -> bool + Send + Sync,
{
    create_selector((select_items,), move |(items,): &(Arc<Vec<E>>,)| {
        Arc::new(items.iter().filter(|item| predicate(item)).cloned().collect())
    })
}

/// The outputs of several same-typed selectors as one list.
pub fn create_array_selector<S, P, T>(
    selectors: Vec<BoxedSelector<S, P, T>>,
) -> impl Selector<S, P, Output = Arc<Vec<T>>>
where
    T: RefEq + Clone + Send + Sync,
{
    create_selector(selectors, |values: &Vec<T>| Arc::new(values.clone()))
}

/// The outputs of several same-typed selectors keyed by name.
pub fn create_object_selector<S, P, T>(
    selectors: Vec<(String, BoxedSelector<S, P, T>)>,
) -> impl Selector<S, P, Output = Arc<BTreeMap<String, T>>>
where
    T: RefEq + Clone + Send + Sync,
{
    let (keys, selectors): (Vec<String>, Vec<BoxedSelector<S, P, T>>) =
        selectors.into_iter().unzip();
    create_selector(selectors, move |values: &Vec<T>| {
        Arc::new(keys.iter().cloned().zip(values.iter().cloned()).collect())
    })
}
