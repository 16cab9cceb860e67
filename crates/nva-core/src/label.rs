//! Label access shared by every named entity

/// Anything that carries a human-readable label.
///
/// The returned `&str` borrows from the entity. Reading a label never consumes
/// or invalidates the value it was read from.
pub trait Labeled {
    fn label(&self) -> &str;
}

impl<T: Labeled + ?Sized> Labeled for &T {
    fn label(&self) -> &str {
        (**self).label()
    }
}

impl<T: Labeled + ?Sized> Labeled for Box<T> {
    fn label(&self) -> &str {
        (**self).label()
    }
}

/// Collect the labels of a slice of entities, preserving order.
pub fn labels<T: Labeled>(items: &[T]) -> Vec<&str> {
    items.iter().map(Labeled::label).collect()
}
