use crate::caml::mlvalues::{Value, ValueType};

/// OCaml's `=` on the simulated heap: same shape and contents, wherever the blocks live
///
/// Doesn't terminate on cyclic values, same as the real thing.
pub fn structural_eq(a: Value, b: Value) -> bool {
    match (a.decode_type(), b.decode_type()) {
        (ValueType::Long(x), ValueType::Long(y)) => x == y,
        (ValueType::Block(x), ValueType::Block(y)) => {
            if x == y {
                return true;
            }

            let (hx, hy) = (x.header(), y.header());
            if hx.tag() != hy.tag() || hx.wosize() != hy.wosize() {
                return false;
            }

            if !hx.is_scannable() {
                return x.bytes() == y.bytes();
            }

            (0..hx.wosize()).all(|i| structural_eq(x.get_field(i), y.get_field(i)))
        }
        _ => false,
    }
}
