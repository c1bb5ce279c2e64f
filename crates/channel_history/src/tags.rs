/// A single message tag: a `(name, optional value)` pair carried alongside a
/// message, analogous to a header. The history backend never interprets
/// tags other than `time`; everything else is opaque payload it stores and
/// replays verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct MessageTag {
    pub name: String,
    pub value: Option<String>,
}

impl MessageTag {
    pub fn new(name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            value: value.map(Into::into),
        }
    }
}

pub fn find_tag<'a>(tags: &'a [MessageTag], name: &str) -> Option<&'a MessageTag> {
    tags.iter().find(|t| t.name == name)
}
