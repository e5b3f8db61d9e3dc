//! Change status flags and the fixed-width status column of GetFileChanges

use serde::{Deserialize, Serialize};
use std::fmt;

/// Set of differences recorded for one path between a snapshot and the live system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusFlags(u32);

impl StatusFlags {
    pub const CREATED: StatusFlags = StatusFlags(1 << 0);
    pub const DELETED: StatusFlags = StatusFlags(1 << 1);
    pub const TYPE: StatusFlags = StatusFlags(1 << 2);
    pub const CONTENT: StatusFlags = StatusFlags(1 << 3);
    pub const PERMISSIONS: StatusFlags = StatusFlags(1 << 4);
    pub const OWNER: StatusFlags = StatusFlags(1 << 5);
    pub const GROUP: StatusFlags = StatusFlags(1 << 6);
    pub const XATTRS: StatusFlags = StatusFlags(1 << 7);
    pub const ACL: StatusFlags = StatusFlags(1 << 8);

    /// Render order of the status column, one character per flag
    const ORDER: [(StatusFlags, char); 9] = [
        (Self::CREATED, '+'),
        (Self::DELETED, '-'),
        (Self::TYPE, 't'),
        (Self::CONTENT, 'c'),
        (Self::PERMISSIONS, 'p'),
        (Self::OWNER, 'u'),
        (Self::GROUP, 'g'),
        (Self::XATTRS, 'x'),
        (Self::ACL, 'a'),
    ];

    pub const fn empty() -> Self {
        StatusFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: StatusFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: StatusFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: StatusFlags) {
        self.0 |= other.0;
    }

    /// Parse the status column of a change line
    ///
    /// `m` is accepted as an alias for content changes; `.` and unknown
    /// characters carry no flag.
    ///
    /// # Examples
    /// ```
    /// use retrace_common::StatusFlags;
    /// let flags = StatusFlags::from_status_str("+.p..");
    /// assert!(flags.contains(StatusFlags::CREATED | StatusFlags::PERMISSIONS));
    /// assert!(!flags.contains(StatusFlags::CONTENT));
    /// ```
    pub fn from_status_str(status: &str) -> Self {
        let mut flags = StatusFlags::empty();
        for ch in status.chars() {
            if ch == 'm' {
                flags.insert(Self::CONTENT);
                continue;
            }
            if let Some((flag, _)) = Self::ORDER.iter().find(|(_, c)| *c == ch) {
                flags.insert(*flag);
            }
        }
        flags
    }

    /// Render the status column: set flags in fixed order, left-justified and
    /// padded with `.` to five characters
    ///
    /// # Examples
    /// ```
    /// use retrace_common::StatusFlags;
    /// assert_eq!(StatusFlags::empty().to_status_string(), ".....");
    /// assert_eq!((StatusFlags::CONTENT | StatusFlags::OWNER).to_status_string(), "cu...");
    /// ```
    pub fn to_status_string(self) -> String {
        let mut out: String = Self::ORDER
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, ch)| *ch)
            .collect();

        while out.len() < 5 {
            out.push('.');
        }
        out
    }
}

impl std::ops::BitOr for StatusFlags {
    type Output = StatusFlags;

    fn bitor(self, rhs: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StatusFlags {
    fn bitor_assign(&mut self, rhs: StatusFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_status_string())
    }
}

/// Coarse change category shown for a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    TypeChanged,
}

impl ChangeKind {
    /// Map the first status character of a change line to a kind
    pub fn from_status_char(ch: char) -> Self {
        match ch {
            '+' => ChangeKind::Created,
            '-' => ChangeKind::Deleted,
            't' => ChangeKind::TypeChanged,
            'c' | 'm' => ChangeKind::Modified,
            _ => ChangeKind::Modified,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::TypeChanged => "type changed",
        }
    }
}
