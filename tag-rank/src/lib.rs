//! # Tag Rank
//!
//! Orders candidate definitions for a reference in source code.
//!
//! ```text
//! line prefix ──> receiver chain (member_exp)
//!                        │
//! candidates ──> scope filter ──> definition filters ──> score ──> stable sort
//!                                                          ├─ kind implied by the reference line
//!                                                          ├─ same file (+ this/self)
//!                                                          └─ path vs receiver (exact + trigrams)
//! ```

pub mod error;
pub mod grams;
pub mod member_exp;
pub mod rank;
pub mod syntax;

pub use error::RankError;
pub use error::Result;
pub use member_exp::MemberExpParser;
pub use member_exp::extract_receiver_chain;
pub use member_exp::extract_receiver_chain_with;
pub use rank::CursorRegion;
pub use rank::RankContext;
pub use rank::RankManager;
pub use rank::TextPosition;
pub use rank::rank_and_filter;
pub use syntax::LanguageSyntax;
pub use syntax::MemberExpSyntax;
pub use syntax::SyntaxTable;
