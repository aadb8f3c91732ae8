//! Commit objects.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use chrono::{DateTime, FixedOffset};
use std::fmt;

/// Who made a commit, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Identity as written, e.g. `Alice <alice@example.com>`.
    pub name: String,
    /// Timestamp with the author's UTC offset.
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    /// Creates a signature.
    pub fn new(name: impl Into<String>, when: DateTime<FixedOffset>) -> Self {
        Self {
            name: name.into(),
            when,
        }
    }

    /// Parses `"<name> <unix-seconds> <+|-HHMM>"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, ' ');
        let tz = parts.next()?;
        let seconds: i64 = parts.next()?.parse().ok()?;
        let name = parts.next()?;

        let (sign, digits) = match tz.as_bytes().first()? {
            b'+' => (1, &tz[1..]),
            b'-' => (-1, &tz[1..]),
            _ => return None,
        };
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;

        let when = DateTime::from_timestamp(seconds, 0)?.with_timezone(&offset);
        Some(Self::new(name, when))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset = self.when.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.abs();
        write!(
            f,
            "{} {} {}{:02}{:02}",
            self.name,
            self.when.timestamp(),
            sign,
            offset / 3600,
            (offset % 3600) / 60
        )
    }
}

/// A decoded commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// Parent commits; commits written here have at most one.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    /// Encodes the commit payload.
    pub fn serialize(&self) -> Vec<u8> {
        let mut content = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            content.push_str(&format!("parent {}\n", parent));
        }
        content.push_str(&format!("author {}\n", self.author));
        content.push_str(&format!("committer {}\n", self.committer));
        content.push('\n');
        content.push_str(&self.message);
        if !self.message.ends_with('\n') {
            content.push('\n');
        }
        content.into_bytes()
    }

    /// Wraps the payload in a commit object.
    pub fn to_object(&self) -> GitObject {
        GitObject::new(ObjectType::Commit, self.serialize())
    }

    /// Parses a commit payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let corrupt = |reason: String| StorageError::CorruptObject {
            id: ObjectId::hash_object(ObjectType::Commit, data).to_hex(),
            reason,
        };
        let text =
            std::str::from_utf8(data).map_err(|_| corrupt("commit is not utf-8".to_string()))?;
        let (headers, message) = text.split_once("\n\n").unwrap_or((text, ""));

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            let Some((key, value)) = line.split_once(' ') else {
                continue;
            };
            match key {
                "tree" => tree = Some(ObjectId::from_hex(value)?),
                "parent" => parents.push(ObjectId::from_hex(value)?),
                "author" => author = Signature::parse(value),
                "committer" => committer = Signature::parse(value),
                // gpgsig, encoding, continuation lines, ...
                _ => {}
            }
        }

        Ok(Self {
            tree: tree.ok_or_else(|| corrupt("missing tree header".to_string()))?,
            parents,
            author: author.ok_or_else(|| corrupt("missing or invalid author".to_string()))?,
            committer: committer
                .ok_or_else(|| corrupt("missing or invalid committer".to_string()))?,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64, offset_secs: i32) -> DateTime<FixedOffset> {
        DateTime::from_timestamp(seconds, 0)
            .unwrap()
            .with_timezone(&FixedOffset::east_opt(offset_secs).unwrap())
    }

    fn sample(parents: Vec<ObjectId>) -> Commit {
        let sig = Signature::new("Alice <alice@example.com>", at(1_234_567_890, 0));
        Commit {
            tree: ObjectId::from_bytes([1u8; 20]),
            parents,
            author: sig.clone(),
            committer: sig,
            message: "Initial commit\n".to_string(),
        }
    }

    #[test]
    fn test_signature_format() {
        let sig = Signature::new("tester", at(1_700_000_000, 2 * 3600));
        assert_eq!(sig.to_string(), "tester 1700000000 +0200");

        let sig = Signature::new("tester", at(1_700_000_000, -(5 * 3600 + 30 * 60)));
        assert_eq!(sig.to_string(), "tester 1700000000 -0530");

        let sig = Signature::new("tester", at(0, 0));
        assert_eq!(sig.to_string(), "tester 0 +0000");
    }

    #[test]
    fn test_signature_parse() {
        let sig = Signature::parse("A U Thor <a@b.c> 1700000000 -0530").unwrap();
        assert_eq!(sig.name, "A U Thor <a@b.c>");
        assert_eq!(sig.when.timestamp(), 1_700_000_000);
        assert_eq!(sig.when.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));

        assert!(Signature::parse("nobody").is_none());
        assert!(Signature::parse("x 12 0000").is_none());
        assert!(Signature::parse("x abc +0000").is_none());
    }

    #[test]
    fn test_serialize_layout() {
        let text = String::from_utf8(sample(vec![]).serialize()).unwrap();
        assert_eq!(
            text,
            format!(
                "tree {}\nauthor Alice <alice@example.com> 1234567890 +0000\n\
                 committer Alice <alice@example.com> 1234567890 +0000\n\nInitial commit\n",
                "01".repeat(20)
            )
        );
    }

    #[test]
    fn test_message_gets_trailing_newline() {
        let mut commit = sample(vec![]);
        commit.message = "no newline".to_string();
        assert!(commit.serialize().ends_with(b"\n\nno newline\n"));
    }

    #[test]
    fn test_parse_roundtrip() {
        let commit = sample(vec![ObjectId::from_bytes([2u8; 20])]);
        assert_eq!(Commit::parse(&commit.serialize()).unwrap(), commit);
    }

    #[test]
    fn test_parse_multiple_parents() {
        let commit = sample(vec![
            ObjectId::from_bytes([2u8; 20]),
            ObjectId::from_bytes([3u8; 20]),
        ]);
        let parsed = Commit::parse(&commit.serialize()).unwrap();
        assert_eq!(parsed.parents.len(), 2);
    }

    #[test]
    fn test_parse_ignores_unknown_headers() {
        let data = format!(
            "tree {}\nauthor a 1 +0000\ncommitter a 1 +0000\nencoding UTF-8\n\nmsg\n",
            "ab".repeat(20)
        );
        let commit = Commit::parse(data.as_bytes()).unwrap();
        assert_eq!(commit.message, "msg\n");
        assert!(commit.parents.is_empty());
    }

    #[test]
    fn test_parse_missing_tree() {
        assert!(matches!(
            Commit::parse(b"author a 1 +0000\ncommitter a 1 +0000\n\nmsg\n"),
            Err(StorageError::CorruptObject { .. })
        ));
    }
}
