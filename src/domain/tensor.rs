//! Tensor - 跨执行上下文传输的数值张量
//!
//! 不变量: data 长度 == dims 各维乘积

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 张量错误
#[derive(Debug, Error, PartialEq)]
pub enum TensorError {
    #[error("Shape mismatch: dims {dims:?} require {expected} elements, got {actual}")]
    ShapeMismatch {
        dims: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Element count of dims {0:?} overflows")]
    TooLarge(Vec<usize>),

    #[error("Unknown dtype: {0}")]
    UnknownDType(String),

    #[error("Byte length {len} is not a multiple of {dtype} element size")]
    InvalidByteLength { dtype: DType, len: usize },

    #[error("Tensor must be 1-D or [channels, samples], got dims {0:?}")]
    NotAudio(Vec<usize>),
}

/// 数值类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Uint8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uint8" => Some(DType::Uint8),
            "int16" => Some(DType::Int16),
            "int32" => Some(DType::Int32),
            "int64" => Some(DType::Int64),
            "float32" => Some(DType::Float32),
            "float64" => Some(DType::Float64),
            _ => None,
        }
    }

    /// 单个元素的字节数
    pub fn size_of(&self) -> usize {
        match self {
            DType::Uint8 => 1,
            DType::Int16 => 2,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 连续存储的扁平数据
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Uint8(_) => DType::Uint8,
            TensorData::Int16(_) => DType::Int16,
            TensorData::Int32(_) => DType::Int32,
            TensorData::Int64(_) => DType::Int64,
            TensorData::Float32(_) => DType::Float32,
            TensorData::Float64(_) => DType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::Uint8(v) => v.len(),
            TensorData::Int16(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// dims 的乘积，溢出时为 None
pub fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// 数值张量
///
/// 通道边界上总是按值复制，不共享内存
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// 创建张量，校验 dims 与数据长度一致
    pub fn new(dims: Vec<usize>, data: TensorData) -> Result<Self, TensorError> {
        let Some(expected) = element_count(&dims) else {
            return Err(TensorError::TooLarge(dims));
        };
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// 一维 float32 波形
    pub fn waveform(samples: Vec<f32>) -> Self {
        Self {
            dims: vec![samples.len()],
            data: TensorData::Float32(samples),
        }
    }

    /// 标量 int64（如 duration 输入）
    pub fn scalar_i64(value: i64) -> Self {
        Self {
            dims: vec![1],
            data: TensorData::Int64(vec![value]),
        }
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// 元素总数
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            TensorData::Uint8(v) => Some(v),
            _ => None,
        }
    }

    /// 任意 dtype 转为 f32 元素（不做归一化）
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::Uint8(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::Int16(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::Int32(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::Int64(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::Float32(v) => v.clone(),
            TensorData::Float64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// 读取首个元素为 i64（标量输入输出用）
    pub fn first_i64(&self) -> Option<i64> {
        match &self.data {
            TensorData::Uint8(v) => v.first().map(|&x| x as i64),
            TensorData::Int16(v) => v.first().map(|&x| x as i64),
            TensorData::Int32(v) => v.first().map(|&x| x as i64),
            TensorData::Int64(v) => v.first().copied(),
            TensorData::Float32(v) => v.first().map(|&x| x as i64),
            TensorData::Float64(v) => v.first().map(|&x| x as i64),
        }
    }

    /// 改变形状，元素总数必须不变
    pub fn reshape(self, dims: Vec<usize>) -> Result<Self, TensorError> {
        Self::new(dims, self.data)
    }

    /// 转为 float32 一维波形（多通道时取通道平均）
    ///
    /// 支持 `[samples]` 和 `[channels, samples]`
    pub fn into_mono(self) -> Result<Vec<f32>, TensorError> {
        match self.dims.len() {
            1 => Ok(match self.data {
                TensorData::Float32(v) => v,
                _ => self.to_f32_vec(),
            }),
            2 if self.dims[0] == 1 => Ok(self.to_f32_vec()),
            2 => {
                let (channels, len) = (self.dims[0], self.dims[1]);
                let flat = self.to_f32_vec();
                let mut mono = vec![0.0f32; len];
                for ch in 0..channels {
                    for (i, sample) in flat[ch * len..(ch + 1) * len].iter().enumerate() {
                        mono[i] += sample;
                    }
                }
                let scale = 1.0 / channels.max(1) as f32;
                mono.iter_mut().for_each(|s| *s *= scale);
                Ok(mono)
            }
            _ => Err(TensorError::NotAudio(self.dims)),
        }
    }

    /// 小端字节序的原始数据
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.numel() * self.dtype().size_of());
        match &self.data {
            TensorData::Uint8(v) => out.extend_from_slice(v),
            TensorData::Int16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            TensorData::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            TensorData::Int64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            TensorData::Float32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            TensorData::Float64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
        out
    }

    /// 从小端字节重建张量（逐位还原）
    pub fn from_le_bytes(dtype: DType, dims: Vec<usize>, bytes: &[u8]) -> Result<Self, TensorError> {
        let size = dtype.size_of();
        if bytes.len() % size != 0 {
            return Err(TensorError::InvalidByteLength {
                dtype,
                len: bytes.len(),
            });
        }

        let chunks = bytes.chunks_exact(size);
        let data = match dtype {
            DType::Uint8 => TensorData::Uint8(bytes.to_vec()),
            DType::Int16 => TensorData::Int16(
                chunks.map(|c| i16::from_le_bytes([c[0], c[1]])).collect(),
            ),
            DType::Int32 => TensorData::Int32(
                chunks
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DType::Int64 => TensorData::Int64(
                chunks
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            DType::Float32 => TensorData::Float32(
                chunks
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DType::Float64 => TensorData::Float64(
                chunks
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
        };

        Self::new(dims, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = Tensor::new(vec![2, 3], TensorData::Float32(vec![0.0; 5]));
        assert!(matches!(
            result,
            Err(TensorError::ShapeMismatch { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn test_overflowing_dims_rejected() {
        assert_eq!(element_count(&[usize::MAX, 2]), None);
        assert_eq!(element_count(&[2, 3, 4]), Some(24));

        let result = Tensor::new(vec![usize::MAX, 2], TensorData::Float32(Vec::new()));
        assert!(matches!(result, Err(TensorError::TooLarge(_))));
    }

    #[test]
    fn test_reshape_keeps_elements() {
        let t = Tensor::new(vec![6], TensorData::Int16(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let t = t.reshape(vec![1, 2, 3]).unwrap();
        assert_eq!(t.dims(), &[1, 2, 3]);
        assert!(t.clone().reshape(vec![4]).is_err());
    }

    #[test]
    fn test_into_mono_averages_channels() {
        let stereo = Tensor::new(
            vec![2, 3],
            TensorData::Float32(vec![1.0, 0.0, 0.5, 0.0, 1.0, 0.5]),
        )
        .unwrap();
        assert_eq!(stereo.into_mono().unwrap(), vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_le_bytes_preserve_float_bits() {
        let values = vec![f32::MIN_POSITIVE, -0.0, 1.0e-40, f32::MAX];
        let t = Tensor::new(vec![2, 2], TensorData::Float32(values.clone())).unwrap();
        let back = Tensor::from_le_bytes(DType::Float32, vec![2, 2], &t.to_le_bytes()).unwrap();
        let bits: Vec<u32> = back.as_f32().unwrap().iter().map(|x| x.to_bits()).collect();
        let expected: Vec<u32> = values.iter().map(|x| x.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_invalid_byte_length() {
        let result = Tensor::from_le_bytes(DType::Int32, vec![1], &[0, 1, 2]);
        assert!(matches!(result, Err(TensorError::InvalidByteLength { .. })));
    }
}
