//! Wire models for the Librarian API.
//!
//! - `User`, `AuthPayload`: accounts and authentication results
//! - `Library`, `Title`, `BookCopy`: the catalog
//! - `Borrowing`: loans of a copy to a user

pub mod borrowing;
pub mod catalog;
pub mod user;

pub use borrowing::{BorrowRequest, Borrowing, BorrowingStatus};
pub use catalog::{BookCopy, CopyStatus, Library, NewTitle, Title, TitleUpdate};
pub use user::{AuthPayload, LoginRequest, RegisterRequest, User, UserRole};
