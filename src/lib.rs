//! # srevm
//!
//! Backtracking regular-expression virtual machine. It executes
//! precompiled opcode programs over byte, Latin-1, UCS-2 and UCS-4
//! subjects, using the same wire format as the `_sre` engine.
//!
//! Programs arrive already compiled (a flat `u32` array plus group
//! metadata). They are validated once at construction, then executed by
//! an explicit-stack interpreter whose native stack depth does not grow
//! with backtracking depth.
//!
//! ## Quick Start
//!
//! ```rust
//! use srevm::prelude::*;
//!
//! // (\w+)@(\w+)
//! let word = |b: &mut ProgramBuilder| {
//!     b.repeat_one(1, MAXREPEAT, |b| {
//!         b.in_set(|s| {
//!             s.category(CategoryCode::UniWord);
//!         });
//!     });
//! };
//! let code = ProgramBuilder::new()
//!     .group(1, word)
//!     .literal('@')
//!     .group(2, word)
//!     .build();
//! let re = Pattern::builder(code).groups(2).build().unwrap();
//!
//! let text = SubjectBuf::from("mail bob@example now");
//! let m = re.search(&text, ..).unwrap().unwrap();
//! assert_eq!(m.range(), 5..16);
//! assert_eq!(m.group(2).unwrap().unwrap().to_string_lossy(), "example");
//!
//! let swapped = re
//!     .sub(Replacement::Text(SubjectBuf::from(r"\2 at \1").as_subject()), &text, 0)
//!     .unwrap();
//! assert_eq!(swapped.to_string_lossy(), "mail example at bob now");
//! ```
//!
//! ## Module Structure
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Opcodes, assertion and category codes, flags |
//! | [`validate`] | Structural checks run before a program is accepted |
//! | [`exec`] | Opcode interpreter |
//! | [`search`] | Leftmost-match driver with prefix and charset scans |
//! | [`state`] | Per-session state, engine limits, interrupts |
//! | [`api`] | `Pattern`, `Match`, `Scanner` and the global operations |
//! | [`template`] | Replacement templates for `sub` and `expand` |
//! | [`builder`] | Structured assembly of opcode programs |
//! | [`chars`] | Character classes and case mapping |
//! | [`subject`] | Input sequences at 1, 2 or 4 bytes per unit |
//! | [`error`] | Error types and engine status codes |

pub mod api;
pub mod builder;
pub mod chars;
pub mod constants;
pub mod error;
pub mod exec;
pub mod prelude;
pub mod search;
mod stack;
pub mod state;
pub mod subject;
pub mod template;
pub mod validate;
