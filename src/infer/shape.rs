//! Shape arithmetic
//!
//! Shapes are sequences of [`Dim`]: non-negative extents plus a distinguished
//! dynamic/unknown sentinel. The `-1` "infer this dimension" convention is
//! resolved only at reshape-like operators, against the total element count;
//! everywhere else negative or unknown dimensions pass through as
//! [`Dim::Dynamic`].

use smallvec::SmallVec;

/// One dimension of a tensor shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Known non-negative extent
    Fixed(u64),
    /// Unknown/dynamic extent
    Dynamic,
}

impl Dim {
    /// Known extent, if any
    pub fn fixed(self) -> Option<u64> {
        match self {
            Dim::Fixed(v) => Some(v),
            Dim::Dynamic => None,
        }
    }

    /// Whether the extent is known
    pub fn is_fixed(self) -> bool {
        matches!(self, Dim::Fixed(_))
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dim::Fixed(v) => write!(f, "{v}"),
            Dim::Dynamic => write!(f, "?"),
        }
    }
}

/// A tensor shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub SmallVec<[Dim; 4]>);

impl Shape {
    /// Scalar (rank-0) shape
    pub fn scalar() -> Self {
        Shape(SmallVec::new())
    }

    /// Shape from known extents
    pub fn from_dims(dims: &[usize]) -> Self {
        Shape(dims.iter().map(|d| Dim::Fixed(*d as u64)).collect())
    }

    /// Shape from loader-declared integers: negative values become dynamic
    pub fn from_ints(dims: &[i64]) -> Self {
        Shape(
            dims.iter()
                .map(|d| {
                    if *d < 0 {
                        Dim::Dynamic
                    } else {
                        Dim::Fixed(*d as u64)
                    }
                })
                .collect(),
        )
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Dimension at an axis
    pub fn dim(&self, axis: usize) -> Option<Dim> {
        self.0.get(axis).copied()
    }

    /// Whether every dimension is known
    pub fn is_fully_defined(&self) -> bool {
        self.0.iter().all(|d| d.is_fixed())
    }

    /// Total element count, if every dimension is known
    pub fn num_elements(&self) -> Option<u64> {
        self.0.iter().map(|d| d.fixed()).product()
    }

    /// The shape as plain integers, dynamic dims as `-1`
    pub fn to_ints(&self) -> Vec<i64> {
        self.0
            .iter()
            .map(|d| match d {
                Dim::Fixed(v) => *v as i64,
                Dim::Dynamic => -1,
            })
            .collect()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// NumPy-style right-aligned broadcast of two shapes
///
/// A `Dynamic` dimension broadcasts to `Dynamic` unless the other side is a
/// provable 1. Returns `None` on a provable extent conflict.
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Option<Shape> {
    let rank = a.rank().max(b.rank());
    let mut out: SmallVec<[Dim; 4]> = SmallVec::with_capacity(rank);
    for i in 0..rank {
        let da = dim_from_right(a, rank - 1 - i);
        let db = dim_from_right(b, rank - 1 - i);
        out.push(broadcast_dim(da, db)?);
    }
    Some(Shape(out))
}

fn dim_from_right(shape: &Shape, axis: usize) -> Dim {
    // missing leading axes broadcast as 1
    if axis >= shape.rank() {
        Dim::Fixed(1)
    } else {
        shape.0[shape.rank() - 1 - axis]
    }
}

fn broadcast_dim(a: Dim, b: Dim) -> Option<Dim> {
    match (a, b) {
        (Dim::Fixed(1), other) | (other, Dim::Fixed(1)) => Some(other),
        (Dim::Fixed(x), Dim::Fixed(y)) if x == y => Some(Dim::Fixed(x)),
        (Dim::Fixed(_), Dim::Fixed(_)) => None,
        _ => Some(Dim::Dynamic),
    }
}

/// Resolve a reshape-like target against an input element count
///
/// `target` follows the `-1` convention: at most one entry may be `-1`, and
/// it is inferred by dividing the input element count by the product of the
/// remaining entries. Returns an error string (for the caller to wrap with
/// node identity) when the division does not come out even, when more than
/// one `-1` appears, or when a zero/negative extent other than `-1` occurs.
/// A dynamic input element count turns the inferred dimension dynamic.
pub fn resolve_reshape_target(input: &Shape, target: &[i64]) -> Result<Shape, String> {
    let mut infer_at: Option<usize> = None;
    let mut known_product: u64 = 1;
    let mut out: SmallVec<[Dim; 4]> = SmallVec::with_capacity(target.len());

    for (i, &t) in target.iter().enumerate() {
        match t {
            -1 => {
                if infer_at.is_some() {
                    return Err("more than one -1 entry in reshape target".to_string());
                }
                infer_at = Some(i);
                out.push(Dim::Dynamic); // patched below
            }
            t if t < -1 => {
                return Err(format!("invalid reshape target extent {t}"));
            }
            t => {
                known_product = known_product.saturating_mul(t as u64);
                out.push(Dim::Fixed(t as u64));
            }
        }
    }

    if let Some(idx) = infer_at {
        match input.num_elements() {
            Some(total) => {
                if known_product == 0 || total % known_product != 0 {
                    return Err(format!(
                        "{total} elements not divisible by {known_product}"
                    ));
                }
                out[idx] = Dim::Fixed(total / known_product);
            }
            None => {
                // dynamic input: the inferred extent stays unknown
                out[idx] = Dim::Dynamic;
            }
        }
    } else if let Some(total) = input.num_elements() {
        if out.iter().all(|d| d.is_fixed()) && known_product != total {
            return Err(format!(
                "reshape target holds {known_product} elements, input holds {total}"
            ));
        }
    }

    Ok(Shape(out))
}
