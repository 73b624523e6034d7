use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single collected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Integer(i64),
    Choice(String),
    List(Vec<String>),
}

impl AnswerValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AnswerValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) | AnswerValue::Choice(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Text(s) | AnswerValue::Choice(s) => f.write_str(s),
            AnswerValue::Integer(n) => write!(f, "{}", n),
            AnswerValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Field name to value, kept in the order the fields were first answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers {
    entries: Vec<(String, AnswerValue)>,
}

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite in place; a field keeps its original position.
    pub fn insert(&mut self, field: impl Into<String>, value: AnswerValue) {
        let field = field.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&AnswerValue> {
        self.entries.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(AnswerValue::as_integer)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(AnswerValue::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnswerValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Answers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Answers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AnswersVisitor;

        impl<'de> Visitor<'de> for AnswersVisitor {
            type Value = Answers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of answer fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Answers, A::Error> {
                let mut answers = Answers::new();
                while let Some((k, v)) = access.next_entry::<String, AnswerValue>()? {
                    answers.insert(k, v);
                }
                Ok(answers)
            }
        }

        deserializer.deserialize_map(AnswersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_keeps_position() {
        let mut answers = Answers::new();
        answers.insert("a", AnswerValue::Integer(1));
        answers.insert("b", AnswerValue::Text("x".into()));
        answers.insert("a", AnswerValue::Integer(7));

        assert_eq!(answers.fields(), vec!["a", "b"]);
        assert_eq!(answers.integer("a"), Some(7));
    }

    #[test]
    fn json_keeps_field_order() {
        let mut answers = Answers::new();
        answers.insert("zeta", AnswerValue::Choice("home".into()));
        answers.insert("alpha", AnswerValue::List(vec!["count".into()]));

        let json = serde_json::to_string(&answers).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());

        let back: Answers = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fields(), vec!["zeta", "alpha"]);
    }
}
