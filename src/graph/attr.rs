//! Typed attribute values
//!
//! Nodes carry a name → [`AttrValue`] map. Attribute values are plain data;
//! nested graphs are owned through `ControlFlowInfo`, never through an
//! attribute, so graph ownership stays single-path.

use ndarray::ArrayD;

/// Constant tensor payload attached to data nodes and value-propagating
/// operators
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Integer tensor (shape vectors, axis lists, index tensors)
    I64(ArrayD<i64>),
    /// Floating point tensor (weights, folded constants)
    F32(ArrayD<f32>),
}

impl TensorData {
    /// Build a rank-1 integer tensor
    pub fn from_i64s(values: Vec<i64>) -> Self {
        let len = values.len();
        TensorData::I64(ArrayD::from_shape_vec(vec![len], values).expect("rank-1 shape"))
    }

    /// Build a scalar integer tensor
    pub fn scalar_i64(value: i64) -> Self {
        TensorData::I64(ArrayD::from_elem(vec![], value))
    }

    /// Build a rank-1 float tensor
    pub fn from_f32s(values: Vec<f32>) -> Self {
        let len = values.len();
        TensorData::F32(ArrayD::from_shape_vec(vec![len], values).expect("rank-1 shape"))
    }

    /// Dimensions of the payload
    pub fn dims(&self) -> &[usize] {
        match self {
            TensorData::I64(a) => a.shape(),
            TensorData::F32(a) => a.shape(),
        }
    }

    /// Rank of the payload
    pub fn rank(&self) -> usize {
        self.dims().len()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.dims().iter().product()
    }

    /// Whether the payload has zero elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the payload as a flat integer slice, if it is an integer tensor
    /// stored contiguously
    pub fn as_i64_slice(&self) -> Option<&[i64]> {
        match self {
            TensorData::I64(a) => a.as_slice(),
            TensorData::F32(_) => None,
        }
    }

    /// Permute the payload axes in place (used by layout conversion)
    pub fn permute_axes(&mut self, order: &[usize]) {
        match self {
            TensorData::I64(a) => {
                let moved = std::mem::replace(a, ArrayD::from_elem(vec![], 0));
                *a = moved.permuted_axes(order.to_vec()).as_standard_layout().to_owned();
            }
            TensorData::F32(a) => {
                let moved = std::mem::replace(a, ArrayD::from_elem(vec![], 0.0));
                *a = moved.permuted_axes(order.to_vec()).as_standard_layout().to_owned();
            }
        }
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// String attribute
    Str(String),
    /// Integer attribute (axis, count, flag-like values)
    Int(i64),
    /// Integer sequence attribute (shapes, axis lists, permutation orders)
    Ints(Vec<i64>),
    /// Floating point attribute
    Float(f32),
    /// Boolean attribute
    Bool(bool),
    /// Constant tensor attribute
    Tensor(TensorData),
}

impl AttrValue {
    /// Read as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as integer sequence
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Ints(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Read as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Read as float
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as tensor payload
    pub fn as_tensor(&self) -> Option<&TensorData> {
        match self {
            AttrValue::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<TensorData> for AttrValue {
    fn from(v: TensorData) -> Self {
        AttrValue::Tensor(v)
    }
}
