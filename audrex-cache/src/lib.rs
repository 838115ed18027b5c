pub mod buffer;
pub mod cache;

pub use buffer::AudioBuffer;
pub use cache::{AssetError, AudioCache};
pub use string_cache::DefaultAtom as Atom;
