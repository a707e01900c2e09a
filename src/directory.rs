// Room directory: the venue's location groups and the rooms they own.
// The tables mirror the remote system's numbering and never change at runtime.

use std::ops::Range;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("no group owns room id {0}")]
    UnknownRoomId(String),

    #[error("duplicate room code across groups: {0}")]
    DuplicateRoomCode(String),
}

/// A bookable room. The remote id is opaque to us and stays a string.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub remote_id: String,
}

#[derive(Debug, Clone)]
pub struct RoomGroup {
    pub id: String,
    pub name: String,
    pub rooms: Vec<Room>,
}

/// Immutable lookup tables, built once at startup and passed by reference.
///
/// Lookups are linear scans; the whole directory is ~100 entries.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    groups: Vec<RoomGroup>,
}

impl RoomDirectory {
    /// Builds a directory, rejecting room codes claimed by more than one group.
    /// Uniqueness is a load-time check, not a type-level guarantee.
    pub fn new(groups: Vec<RoomGroup>) -> Result<Self, DirectoryError> {
        let mut seen: Vec<&str> = Vec::new();
        for group in &groups {
            for room in &group.rooms {
                if seen.contains(&room.code.as_str()) {
                    return Err(DirectoryError::DuplicateRoomCode(room.code.clone()));
                }
                seen.push(&room.code);
            }
        }
        Ok(Self { groups })
    }

    /// The ESMUC venue tables, as numbered by the remote system.
    pub fn esmuc() -> Result<Self, DirectoryError> {
        let mut groups = vec![
            RoomGroup {
                id: "6".into(),
                name: "cabina".into(),
                rooms: room_run("C", 102..119, 94, &[]),
            },
            RoomGroup {
                id: "5".into(),
                name: "instrument individual".into(),
                rooms: {
                    let mut rooms = room_run("A", 119..121, 19, &[]);
                    rooms.push(Room {
                        code: "A125".into(),
                        remote_id: "26".into(),
                    });
                    rooms.push(Room {
                        code: "A126".into(),
                        remote_id: "25".into(),
                    });
                    rooms.extend(room_run("A", 301..337, 35, &[304..322]));
                    rooms
                },
            },
            RoomGroup {
                id: "4".into(),
                name: "cambra".into(),
                rooms: room_run("A", 304..339, 38, &[308..314, 316..318, 319..337]),
            },
            RoomGroup {
                id: "11".into(),
                name: "pianistes".into(),
                rooms: room_run("A", 339..344, 73, &[]),
            },
        ];

        // Groups the venue defines but exposes no individually numbered rooms for.
        for (name, id) in [
            ("col·lectiva", "3"),
            ("jazz i mm", "7"),
            ("musica antiga", "9"),
            ("percussió", "10"),
            ("aules de concert", "12"),
            ("improvisació", "13"),
            ("audiovisuals", "14"),
            ("informàtica", "15"),
            ("aules especifiques", "18"),
        ] {
            groups.push(RoomGroup {
                id: id.into(),
                name: name.into(),
                rooms: Vec::new(),
            });
        }

        Self::new(groups)
    }

    pub fn groups(&self) -> &[RoomGroup] {
        &self.groups
    }

    /// Exact, case-sensitive room-code lookup. "A340" matches, "a340" does not.
    pub fn resolve_room_id(&self, room_name: &str) -> Result<&str, DirectoryError> {
        for group in &self.groups {
            for room in &group.rooms {
                if room.code == room_name {
                    return Ok(&room.remote_id);
                }
            }
        }
        Err(DirectoryError::UnknownRoom(room_name.to_string()))
    }

    /// Reverse lookup: which group owns the room with this remote id.
    pub fn resolve_group(&self, room_id: &str) -> Result<&str, DirectoryError> {
        for group in &self.groups {
            if group.rooms.iter().any(|room| room.remote_id == room_id) {
                return Ok(&group.id);
            }
        }
        Err(DirectoryError::UnknownRoomId(room_id.to_string()))
    }
}

// Pairs consecutive room numbers with consecutive remote ids, then drops the
// pairs whose room number falls in a skipped range. Skipping happens after
// pairing, so skipped rooms still consume their ids.
fn room_run(prefix: &str, numbers: Range<u32>, first_id: u32, skip: &[Range<u32>]) -> Vec<Room> {
    numbers
        .zip(first_id..)
        .filter(|(number, _)| !skip.iter().any(|range| range.contains(number)))
        .map(|(number, id)| Room {
            code: format!("{prefix}{number}"),
            remote_id: id.to_string(),
        })
        .collect()
}
