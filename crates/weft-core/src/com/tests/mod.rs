#[cfg(test)]
mod connection_tests;

#[cfg(test)]
mod tests {
    use crate::com::signature::{SignalArgs, Signature};

    #[test]
    fn test_signature_compares_types_by_position() {
        assert_eq!(Signature::of::<(i64, String)>(), <(i64, String)>::signature());
        assert_ne!(Signature::of::<(i64, String)>(), Signature::of::<(String, i64)>());
        assert_ne!(Signature::of::<(i64,)>(), Signature::of::<(i64, i64)>());
    }

    #[test]
    fn test_signature_arity_and_display() {
        let empty = Signature::of::<()>();
        assert_eq!(empty.arity(), 0);
        assert_eq!(empty.to_string(), "()");

        let pair = Signature::of::<(u8, bool)>();
        assert_eq!(pair.arity(), 2);
        assert_eq!(pair.to_string(), "(u8, bool)");
    }
}
