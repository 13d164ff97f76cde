// dkimcheck – verification of DKIM signatures
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Tag-value lists, the `tag=value; ...` format shared by the DKIM-Signature
//! header and the DKIM public key record.

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagSpec {
    pub name: Box<str>,
    pub value: Box<str>,
}

/// A tag-value list with unique tag names, in order of first appearance.
///
/// Parsing is lenient: pieces without `=` and pieces with an empty tag name are
/// dropped, and when a tag occurs more than once the last value wins.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagList(Vec<TagSpec>);

impl TagList {
    /// Parses a tag-value list after removing all whitespace from it, including
    /// folding whitespace inside tag values.
    pub fn parse_compact(s: &str) -> Self {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        Self::parse(&s)
    }

    /// Parses a tag-value list, trimming whitespace around each tag name and
    /// value.
    pub fn parse(s: &str) -> Self {
        let mut tags = Self::default();

        for piece in s.split(';') {
            if let Some((name, value)) = piece.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    tags.insert(name, value.trim());
                }
            }
        }

        tags
    }

    fn insert(&mut self, name: &str, value: &str) {
        match self.0.iter_mut().find(|t| &*t.name == name) {
            Some(tag) => tag.value = value.into(),
            None => self.0.push(TagSpec {
                name: name.into(),
                value: value.into(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| &*t.name == name)
            .map(|t| &*t.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes the named tags, leaving only the others in the list.
    pub fn without(mut self, names: &[&str]) -> Self {
        self.0.retain(|t| !names.contains(&&*t.name));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[TagSpec]> for TagList {
    fn as_ref(&self) -> &[TagSpec] {
        &self.0
    }
}

/// Splits a colon-separated tag value, trimming each element.
pub fn parse_colon_separated_tag_value(value: &str) -> Vec<&str> {
    value.split(':').map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_compact_ok() {
        let example = " v = 1 ; a=rsa-sha256;d=example.net; s=brisbane;\r
  h=from:to:\r
   subject:date;\r
  bh=MTIzNDU2Nzg5MDEy\r
   MzQ1Njc4OTAxMjM0NTY3ODkwMTI=;\r
  b=dzdVyOfAKCdLX==;";

        let tags = TagList::parse_compact(example);

        assert_eq!(tags.get("v"), Some("1"));
        assert_eq!(tags.get("h"), Some("from:to:subject:date"));
        assert_eq!(tags.get("bh"), Some("MTIzNDU2Nzg5MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTI="));
        assert_eq!(tags.get("b"), Some("dzdVyOfAKCdLX=="));
        assert_eq!(tags.as_ref().len(), 7);
    }

    #[test]
    fn parse_last_duplicate_wins() {
        let tags = TagList::parse("a=1; b=2; a=3; =4; c; d=");

        assert_eq!(
            tags.as_ref(),
            [
                TagSpec { name: "a".into(), value: "3".into() },
                TagSpec { name: "b".into(), value: "2".into() },
                TagSpec { name: "d".into(), value: "".into() },
            ]
        );
        assert!(!tags.contains("c"));
    }

    #[test]
    fn parse_value_keeps_inner_equals() {
        let tags = TagList::parse(" p = YWJj== ; n=a=b ");

        assert_eq!(tags.get("p"), Some("YWJj=="));
        assert_eq!(tags.get("n"), Some("a=b"));
    }

    #[test]
    fn without_ok() {
        let tags = TagList::parse("a=1; b=2; c=3").without(&["a", "c"]);

        assert_eq!(tags.get("b"), Some("2"));
        assert!(!tags.contains("a"));
    }

    #[test]
    fn parse_colon_separated_tag_value_ok() {
        assert_eq!(parse_colon_separated_tag_value("ab: c :d"), ["ab", "c", "d"]);
        assert_eq!(parse_colon_separated_tag_value(""), [""]);
    }
}
