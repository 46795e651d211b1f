pub mod corpus;
pub mod handle;
pub mod index;
pub mod tokenize;

pub use corpus::{builtin_corpus, load_corpus_dir};
pub use handle::IndexHandle;
pub use index::TfIdfIndex;
pub use tokenize::{is_stopword, tokenize};
