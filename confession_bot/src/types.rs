//! Small enums that get stored in the database as integers.
//!
//! All of these round-trip through `u8`; the database stores them in
//! integer columns, so an unknown value coming back means the schema
//! and the code disagree, which is a bug worth panicking over.

/// Moderation state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

impl From<u8> for PostStatus {
    fn from(value: u8) -> Self {
        use PostStatus::*;
        match value {
            value if value == Pending as u8 => Pending,
            value if value == Approved as u8 => Approved,
            value if value == Rejected as u8 => Rejected,
            _ => panic!("Unknown value: {}", value),
        }
    }
}

impl From<PostStatus> for u8 {
    fn from(value: PostStatus) -> Self {
        value as u8
    }
}

/// What kind of content a post carries. Anything but `Text` has a
/// Telegram `file_id` attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    Text = 0,
    Photo = 1,
    Video = 2,
    Voice = 3,
    Document = 4,
}

impl From<u8> for PostKind {
    fn from(value: u8) -> Self {
        use PostKind::*;
        match value {
            value if value == Text as u8 => Text,
            value if value == Photo as u8 => Photo,
            value if value == Video as u8 => Video,
            value if value == Voice as u8 => Voice,
            value if value == Document as u8 => Document,
            _ => panic!("Unknown value: {}", value),
        }
    }
}

impl From<PostKind> for u8 {
    fn from(value: PostKind) -> Self {
        value as u8
    }
}

/// One of the reactions offered under every channel post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Heart = 0,
    Skull = 1,
    Laugh = 2,
}

/// All reactions, in keyboard order.
pub const REACTIONS: &[ReactionKind] = &[
    ReactionKind::Heart,
    ReactionKind::Skull,
    ReactionKind::Laugh,
];

impl ReactionKind {
    pub fn emoji(self) -> &'static str {
        match self {
            ReactionKind::Heart => "❤️",
            ReactionKind::Skull => "💀",
            ReactionKind::Laugh => "😂",
        }
    }

    /// Parse the numeric payload of a `react:<n>` callback.
    pub fn from_callback_payload(payload: &str) -> Option<ReactionKind> {
        let value: u8 = payload.parse().ok()?;
        REACTIONS.iter().copied().find(|x| *x as u8 == value)
    }
}

impl From<u8> for ReactionKind {
    fn from(value: u8) -> Self {
        use ReactionKind::*;
        match value {
            value if value == Heart as u8 => Heart,
            value if value == Skull as u8 => Skull,
            value if value == Laugh as u8 => Laugh,
            _ => panic!("Unknown value: {}", value),
        }
    }
}

impl From<ReactionKind> for u8 {
    fn from(value: ReactionKind) -> Self {
        value as u8
    }
}

/// Whether a report still needs admin eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Open = 0,
    Resolved = 1,
}

impl From<u8> for ReportStatus {
    fn from(value: u8) -> Self {
        use ReportStatus::*;
        match value {
            value if value == Open as u8 => Open,
            value if value == Resolved as u8 => Resolved,
            _ => panic!("Unknown value: {}", value),
        }
    }
}

impl From<ReportStatus> for u8 {
    fn from(value: ReportStatus) -> Self {
        value as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_u8() {
        for status in [
            PostStatus::Pending,
            PostStatus::Approved,
            PostStatus::Rejected,
        ] {
            assert_eq!(PostStatus::from(u8::from(status)), status);
        }
        for kind in [
            PostKind::Text,
            PostKind::Photo,
            PostKind::Video,
            PostKind::Voice,
            PostKind::Document,
        ] {
            assert_eq!(PostKind::from(u8::from(kind)), kind);
        }
        for reaction in REACTIONS {
            assert_eq!(ReactionKind::from(u8::from(*reaction)), *reaction);
        }
    }

    #[test]
    fn reaction_callback_payload_parses() {
        assert_eq!(
            ReactionKind::from_callback_payload("0"),
            Some(ReactionKind::Heart)
        );
        assert_eq!(
            ReactionKind::from_callback_payload("2"),
            Some(ReactionKind::Laugh)
        );
        assert_eq!(ReactionKind::from_callback_payload("9"), None);
        assert_eq!(ReactionKind::from_callback_payload("borgar"), None);
    }
}
