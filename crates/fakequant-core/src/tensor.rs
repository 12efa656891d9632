//! Tensor boundary.
//!
//! The tensor runtime owns tensors and their buffers. The engine only needs
//! the metadata and a mutable `f32` view, which [`TensorHandle`] exposes.
//! Nothing here allocates or frees a runtime buffer.

use crate::format::ElementFormat;

/// What the engine needs from a runtime tensor.
pub trait TensorHandle {
    /// Declared storage type.
    fn element_type(&self) -> ElementFormat;

    /// Tensor name, if the runtime assigned one.
    fn name(&self) -> Option<&str>;

    /// Number of elements the tensor declares.
    fn element_count(&self) -> usize;

    /// The backing `f32` buffer, or `None` if the tensor has no data yet
    /// (or its storage is not `f32`).
    fn data_mut(&mut self) -> Option<&mut [f32]>;
}

/// Borrowed, non-owning view over a runtime tensor.
#[derive(Debug)]
pub struct TensorView<'a> {
    element_type: ElementFormat,
    name: Option<&'a str>,
    element_count: usize,
    data: Option<&'a mut [f32]>,
}

impl<'a> TensorView<'a> {
    /// View over an `f32` buffer; the element count is the buffer length.
    pub fn f32(name: Option<&'a str>, data: &'a mut [f32]) -> Self {
        Self {
            element_type: ElementFormat::FullPrecision32,
            name,
            element_count: data.len(),
            data: Some(data),
        }
    }

    /// View over a tensor whose data is not available as `f32`.
    pub fn without_data(
        element_type: ElementFormat,
        name: Option<&'a str>,
        element_count: usize,
    ) -> Self {
        Self { element_type, name, element_count, data: None }
    }

    /// View over a buffer declared with some other storage type. Used to
    /// model runtimes that hand out raw pointers regardless of type tag.
    pub fn with_declared_type(
        element_type: ElementFormat,
        name: Option<&'a str>,
        data: &'a mut [f32],
    ) -> Self {
        Self { element_type, name, element_count: data.len(), data: Some(data) }
    }
}

impl TensorHandle for TensorView<'_> {
    fn element_type(&self) -> ElementFormat {
        self.element_type
    }

    fn name(&self) -> Option<&str> {
        self.name
    }

    fn element_count(&self) -> usize {
        self.element_count
    }

    fn data_mut(&mut self) -> Option<&mut [f32]> {
        self.data.as_deref_mut()
    }
}

/// Owned `f32` tensor, for callers without a runtime of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    pub name: Option<String>,
    pub data: Vec<f32>,
}

impl HostTensor {
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        Self { name: Some(name.into()), data }
    }

    pub fn anonymous(data: Vec<f32>) -> Self {
        Self { name: None, data }
    }
}

impl TensorHandle for HostTensor {
    fn element_type(&self) -> ElementFormat {
        ElementFormat::FullPrecision32
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn element_count(&self) -> usize {
        self.data.len()
    }

    fn data_mut(&mut self) -> Option<&mut [f32]> {
        Some(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_view_reports_metadata() {
        let mut data = vec![1.0, 2.0, 3.0];
        let mut view = TensorView::f32(Some("blk.0.ffn_norm"), &mut data);
        assert_eq!(view.element_type(), ElementFormat::FullPrecision32);
        assert_eq!(view.name(), Some("blk.0.ffn_norm"));
        assert_eq!(view.element_count(), 3);
        assert_eq!(view.data_mut().map(|d| d.len()), Some(3));
    }

    #[test]
    fn view_without_data() {
        let mut view = TensorView::without_data(ElementFormat::Half16, None, 64);
        assert_eq!(view.element_count(), 64);
        assert!(view.data_mut().is_none());
    }

    #[test]
    fn host_tensor_is_f32() {
        let mut tensor = HostTensor::new("t", vec![0.5; 4]);
        assert_eq!(tensor.element_type(), ElementFormat::FullPrecision32);
        assert_eq!(tensor.name(), Some("t"));
        assert_eq!(tensor.element_count(), 4);
        assert!(tensor.data_mut().is_some());
        assert_eq!(HostTensor::anonymous(vec![]).name(), None);
    }
}
