// Client library for the Asimut room-booking system (ESMUC instance).

pub mod decode;
pub mod directory;
pub mod session;
pub mod transport;
pub mod window;

// Re-export key types for convenience
pub use decode::{Booking, DecodeError, EventRow};
pub use directory::{DirectoryError, Room, RoomDirectory, RoomGroup};
pub use session::{Session, SessionError, UnavailabilityRecord};
pub use transport::{ClientConfig, HttpTransport, ServerCall, Transport, TransportError};
pub use window::{AvailabilityWindow, WindowEdge, BOOKING_HORIZON_SECS};
