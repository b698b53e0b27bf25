pub mod jwt;
pub mod middleware;
pub mod permissions;

pub use jwt::{Claims, JwtService};
pub use permissions::{current_user, require_organizer};
