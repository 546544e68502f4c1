pub mod diagnostics;
pub mod health;
pub mod landing;
pub mod session;
pub mod static_files;

pub use diagnostics::*;
pub use health::*;
pub use landing::*;
pub use session::*;
pub use static_files::*;
