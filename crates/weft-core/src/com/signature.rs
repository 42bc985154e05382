use std::any::TypeId;
use std::fmt;

/// Runtime token describing the argument types carried by a signal or
/// accepted by a slot. Two tokens are equal when their `TypeId`s match
/// position by position; the type names only serve diagnostics.
#[derive(Clone)]
pub struct Signature {
    args: Vec<(TypeId, &'static str)>,
}

impl Signature {
    pub fn of<A: SignalArgs>() -> Self {
        A::signature()
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.args.iter().map(|(_, name)| *name).collect()
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .zip(other.args.iter())
                .all(|((a, _), (b, _))| a == b)
    }
}

impl Eq for Signature {}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.type_names().join(", "))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature{}", self)
    }
}

/// Argument tuples that can travel through a signal.
///
/// Implemented for tuples of up to four `Clone + Send + Sync + 'static`
/// values; `()` is the empty signature.
pub trait SignalArgs: Clone + Send + Sync + 'static {
    fn signature() -> Signature;
}

macro_rules! impl_signal_args {
    ($($name:ident),*) => {
        impl<$($name: Clone + Send + Sync + 'static),*> SignalArgs for ($($name,)*) {
            fn signature() -> Signature {
                Signature {
                    args: vec![$((TypeId::of::<$name>(), std::any::type_name::<$name>())),*],
                }
            }
        }
    };
}

impl_signal_args!();
impl_signal_args!(A);
impl_signal_args!(A, B);
impl_signal_args!(A, B, C);
impl_signal_args!(A, B, C, D);
