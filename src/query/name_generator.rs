//! Alias and parameter names that never collide within one query-building pass.

#[derive(Debug, Default)]
pub struct QueryNameGenerator {
    association_counter: u32,
    parameter_counter: u32,
}

impl QueryNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `relatedDummy` → `relatedDummy_a1`, `relatedDummy_a2`, ...
    pub fn generate_join_alias(&mut self, association: &str) -> String {
        self.association_counter += 1;
        format!("{}_a{}", sanitize(association), self.association_counter)
    }

    /// `name` → `name_p1`, `name_p2`, ...
    pub fn generate_parameter_name(&mut self, name: &str) -> String {
        self.parameter_counter += 1;
        format!("{}_p{}", sanitize(name), self.parameter_counter)
    }
}

fn sanitize(name: &str) -> String {
    name.replace('.', "_")
}
