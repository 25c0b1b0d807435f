use serde_json::Value;

/// Accumulates pattern fragments and the values their placeholders bind.
///
/// Placeholders are numbered from the emitter's start index; the next free
/// index is always `start + values.len()`. Subqueries compile into a
/// [`child`](Emitter::child) that starts at the parent's next index and are
/// folded back with [`adopt`](Emitter::adopt), so numbering never collides at
/// any nesting depth.
#[derive(Debug, Clone)]
pub struct Emitter {
    start: usize,
    fragments: Vec<String>,
    values: Vec<Value>,
    sorts: Vec<String>,
}

impl Emitter {
    pub fn new(start: usize) -> Emitter {
        Emitter {
            start,
            fragments: vec![],
            values: vec![],
            sorts: vec![],
        }
    }

    /// The index the next bound value receives.
    pub fn next_index(&self) -> usize {
        self.start + self.values.len()
    }

    /// Binds a value and returns its `$N` placeholder.
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        format!("${}", self.push_value(value.into()))
    }

    /// Binds an identifier and returns its `$N:name` placeholder.
    pub fn bind_name(&mut self, name: impl Into<String>) -> String {
        format!("${}:name", self.push_value(Value::String(name.into())))
    }

    /// Binds a raw SQL fragment and returns its `$N:raw` placeholder.
    pub fn bind_raw(&mut self, sql: impl Into<String>) -> String {
        format!("${}:raw", self.push_value(Value::String(sql.into())))
    }

    fn push_value(&mut self, value: Value) -> usize {
        let index = self.next_index();
        self.values.push(value);
        index
    }

    pub fn push(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// Records an ordering term the enclosing statement must sort by.
    pub fn push_sort(&mut self, term: impl Into<String>) {
        self.sorts.push(term.into());
    }

    /// Number of fragments emitted so far.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// An empty emitter numbering from this one's next index.
    pub fn child(&self) -> Emitter {
        Emitter::new(self.next_index())
    }

    /// Takes over a child's values and sorts, returning its fragments joined
    /// with `separator`, or `None` when the child emitted nothing.
    pub fn adopt(&mut self, child: Emitter, separator: &str) -> Option<String> {
        debug_assert_eq!(child.start, self.next_index());

        let Emitter {
            fragments,
            values,
            sorts,
            ..
        } = child;

        self.values.extend(values);
        self.sorts.extend(sorts);

        if fragments.is_empty() {
            None
        } else {
            Some(fragments.join(separator))
        }
    }

    /// Splits the emitter into its joined pattern, values and sorts.
    pub fn finish(self, separator: &str) -> (String, Vec<Value>, Vec<String>) {
        (self.fragments.join(separator), self.values, self.sorts)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbering_starts_at_start_index() {
        let mut e = Emitter::new(2);
        assert_eq!(e.bind_name("age"), "$2:name");
        assert_eq!(e.bind(json!(1)), "$3");
        assert_eq!(e.bind_raw("\"a\"->>'b'"), "$4:raw");
        assert_eq!(e.next_index(), 5);
    }

    #[test]
    fn child_values_follow_parent() {
        let mut parent = Emitter::new(2);
        parent.bind_name("a");

        let mut child = parent.child();
        let column = child.bind_name("b");
        let value = child.bind(json!(true));
        child.push(format!("{column} = {value}"));

        assert_eq!(parent.adopt(child, " AND "), Some("$3:name = $4".to_string()));
        assert_eq!(parent.next_index(), 5);
    }

    #[test]
    fn adopt_empty_child() {
        let mut parent = Emitter::new(1);
        let child = parent.child();
        assert_eq!(parent.adopt(child, " AND "), None);
    }
}
