//! B-tree driver: cursors and a leaf-chain tree that consults the adaptive
//! hash index the way an ordered index search does.

mod cursor;
mod tree;

pub use cursor::{Cursor, CursorFlag, HashProbe, SearchMode};
pub use tree::BTree;
