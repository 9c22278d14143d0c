//! Trailmark path model
//!
//! Leaf types shared by the client, the server and the on-disk store:
//!
//! - [`Point`]: a value-compared 3D coordinate
//! - [`Path`]: a named, owned, colored point sequence bound to a dimension
//! - [`sanitize_name`]: the single gate every path name passes through
//! - [`derive_color`] / [`parse_color`]: the fixed palette and color input
//! - [`decimate`]: stride-based point reduction that keeps the endpoint
//! - [`lookup`]: name lookup and prefix suggestions for command surfaces

pub mod color;
pub mod decimate;
pub mod error;
pub mod lookup;
pub mod name;
pub mod path;
pub mod point;

pub use color::{derive_color, parse_color, PALETTE};
pub use decimate::decimate;
pub use error::ValidationError;
pub use lookup::{find_by_name, suggest_names};
pub use name::{sanitize_name, DEFAULT_PATH_NAME, MAX_NAME_LEN};
pub use path::{ActorId, Lineage, Path, PathId};
pub use point::Point;
