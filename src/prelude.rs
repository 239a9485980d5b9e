// prelude.rs - Convenient re-exports.
//
//! # Prelude
//!
//! ```
//! use srevm::prelude::*;
//!
//! let code = ProgramBuilder::new().literal('a').literal('b').build();
//! let re = Pattern::builder(code).build().unwrap();
//! let text = SubjectBuf::from("xxab");
//! assert_eq!(re.search(&text, ..).unwrap().unwrap().start(), 2);
//! ```

pub use crate::api::{FindAllItem, FindIter, Match, Pattern, PatternBuilder, Replacement, Scanner};
pub use crate::builder::ProgramBuilder;
pub use crate::constants::{AtCode, CategoryCode, Opcode, SreFlag, MAXREPEAT};
pub use crate::error::{EngineError, Error};
pub use crate::state::Interrupt;
pub use crate::subject::{Subject, SubjectBuf};
pub use crate::template::Template;
