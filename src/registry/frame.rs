//! Identity and payload types for relay routing
//!
//! This module defines the keys used to identify connections and rooms, and
//! the frames that are fanned out to room members.

use bytes::Bytes;

use super::error::RegistryError;

/// Longest room identifier accepted, in bytes
pub const MAX_ROOM_ID_LEN: usize = 128;

/// Opaque identity of one live connection
///
/// Allocated once at connect time and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a connection id from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a room, taken from the request path at connect time
///
/// Never empty. Rooms themselves are not stored anywhere; a room is just the
/// set of registered connections that carry an equal `RoomId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    /// Validate and wrap a room name
    pub fn new(name: impl Into<String>) -> Result<Self, RegistryError> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_ROOM_ID_LEN {
            return Err(RegistryError::InvalidRoom(name));
        }
        Ok(Self(name))
    }

    /// Get the room name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RoomId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Kind of relayed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text message
    Text,
    /// Arbitrary binary message
    Binary,
}

/// A payload to be relayed to room members
///
/// Cheap to clone: the payload is a reference-counted `Bytes`, so every
/// recipient shares the sender's allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    kind: FrameKind,
    data: Bytes,
}

impl RelayFrame {
    /// Create a text frame
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            data: Bytes::from(text.into()),
        }
    }

    /// Create a text frame over an existing buffer without copying it
    ///
    /// Fails if `data` is not valid UTF-8.
    pub fn utf8(data: Bytes) -> Result<Self, std::str::Utf8Error> {
        std::str::from_utf8(&data)?;
        Ok(Self {
            kind: FrameKind::Text,
            data,
        })
    }

    /// Create a binary frame
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Binary,
            data: data.into(),
        }
    }

    /// Get the frame kind
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Get the raw payload
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the payload as text, if this is a text frame
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            // Text frames are validated on construction, so this cannot fail
            FrameKind::Text => std::str::from_utf8(&self.data).ok(),
            FrameKind::Binary => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_validation() {
        assert!(RoomId::new("lobby").is_ok());
        assert!(matches!(
            RoomId::new(""),
            Err(RegistryError::InvalidRoom(_))
        ));
        assert!(RoomId::new("x".repeat(MAX_ROOM_ID_LEN)).is_ok());
        assert!(RoomId::new("x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_room_id_parse() {
        let room: RoomId = "hall".parse().unwrap();
        assert_eq!(room.as_str(), "hall");
        assert_eq!(room.to_string(), "hall");
    }

    #[test]
    fn test_text_frame() {
        let frame = RelayFrame::text("hi");
        assert_eq!(frame.kind(), FrameKind::Text);
        assert_eq!(frame.as_text(), Some("hi"));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_utf8_frame_keeps_buffer() {
        let data = Bytes::from(String::from("héllo"));
        let frame = RelayFrame::utf8(data.clone()).unwrap();
        assert_eq!(frame.kind(), FrameKind::Text);
        assert_eq!(frame.as_text(), Some("héllo"));
        assert_eq!(frame.data().as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_utf8_frame_rejects_invalid() {
        assert!(RelayFrame::utf8(Bytes::from_static(&[0xc3, 0x28])).is_err());
    }

    #[test]
    fn test_binary_frame_has_no_text() {
        let frame = RelayFrame::binary(Bytes::from_static(&[0xff, 0x00]));
        assert_eq!(frame.kind(), FrameKind::Binary);
        assert!(frame.as_text().is_none());
    }

    #[test]
    fn test_clone_shares_payload() {
        let frame = RelayFrame::binary(vec![1u8; 64]);
        let copy = frame.clone();
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
    }
}
