//! Page number type.

use std::fmt;

/// Position of a page within one storage's page table.
///
/// Using `usize` because page tables are slices and the number is used to
/// index them directly: `slots[page.0]`.
///
/// # Example
/// ```
/// use epochpage::PageNo;
///
/// let page = PageNo::new(5);
/// assert_eq!(page.0, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNo(pub usize);

impl PageNo {
    /// Create a new PageNo.
    #[inline]
    pub fn new(page: usize) -> Self {
        PageNo(page)
    }
}

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({})", self.0)
    }
}
