//! Relationship-pattern correction for generated Cypher.
//!
//! Generated queries sometimes reference relationship types or directions
//! that do not exist in the live schema. The corrector extracts every
//! node-relationship-node pattern, checks it against the schema triples,
//! flips patterns that are only valid in the reverse direction and rejects
//! queries whose patterns match nothing in the schema.

use once_cell::sync::Lazy;
use regex::Regex;

use std::collections::HashMap;

use crate::types::RelationshipSchema;

static PROPERTY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{.+?\}").expect("hardcoded regex compiles"));
static NODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.+?\)").expect("hardcoded regex compiles"));
static PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*\).*-.*-.*\(.*\)").expect("hardcoded regex compiles"));
static NODE_RELATION_NODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(+(?P<left_node>[^()]*?)\)(?P<relation>.*?)\((?P<right_node>[^()]*?)\)+")
        .expect("hardcoded regex compiles")
});
static RELATION_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(?P<relation_type>.+?)?(\{.+\})?]").expect("hardcoded regex compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Incoming,
    Outgoing,
    Bidirectional,
}

/// Validates generated Cypher against the relationship triples present in
/// the live schema.
pub struct CypherCorrector {
    schemas: Vec<RelationshipSchema>,
}

impl CypherCorrector {
    pub fn new(schemas: Vec<RelationshipSchema>) -> Self {
        Self { schemas }
    }

    /// Correct the query, or return an empty string when a relationship
    /// pattern matches nothing in the schema.
    pub fn correct(&self, query: &str) -> String {
        let node_variables = detect_node_variables(query);
        let paths = extract_paths(query);
        let mut query = query.to_string();

        for path in paths {
            let mut start_idx = 0usize;
            while start_idx < path.len() {
                let caps = match NODE_RELATION_NODE_PATTERN.captures(&path[start_idx..]) {
                    Some(caps) => caps,
                    None => break,
                };
                let left_node = caps.name("left_node").map(|m| m.as_str()).unwrap_or("");
                let relation = caps.name("relation").map(|m| m.as_str()).unwrap_or("");
                let right_node = caps.name("right_node").map(|m| m.as_str()).unwrap_or("");

                let left_labels = detect_labels(left_node, &node_variables);
                let right_labels = detect_labels(right_node, &node_variables);

                // The pattern spans "(" left ")" relation "(" right ")",
                // plus one trailing character of context when present.
                let end_idx = start_idx + 4 + left_node.len() + relation.len() + right_node.len();
                let mut partial_end = (end_idx + 1).min(path.len());
                while !path.is_char_boundary(partial_end) {
                    partial_end -= 1;
                }
                let original_partial = &path[start_idx..partial_end];

                let (direction, relation_types) = detect_relation_types(relation);

                // Variable-length patterns are not judged against the schema.
                if !relation_types.is_empty() && relation_types.join("").contains('*') {
                    start_idx += left_node.len() + relation.len() + 2;
                    continue;
                }

                match direction {
                    Direction::Outgoing => {
                        if !self.verify_schema(&left_labels, &relation_types, &right_labels) {
                            if self.verify_schema(&right_labels, &relation_types, &left_labels) {
                                let corrected_relation =
                                    format!("<{}", &relation[..relation.len() - 1]);
                                let corrected_partial =
                                    original_partial.replace(relation, &corrected_relation);
                                query = query.replace(original_partial, &corrected_partial);
                            } else {
                                return String::new();
                            }
                        }
                    }
                    Direction::Incoming => {
                        if !self.verify_schema(&right_labels, &relation_types, &left_labels) {
                            if self.verify_schema(&left_labels, &relation_types, &right_labels) {
                                let corrected_relation = format!("{}>", &relation[1..]);
                                let corrected_partial =
                                    original_partial.replace(relation, &corrected_relation);
                                query = query.replace(original_partial, &corrected_partial);
                            } else {
                                return String::new();
                            }
                        }
                    }
                    Direction::Bidirectional => {
                        let legal = self.verify_schema(&left_labels, &relation_types, &right_labels)
                            || self.verify_schema(&right_labels, &relation_types, &left_labels);
                        if !legal {
                            return String::new();
                        }
                    }
                }

                start_idx += left_node.len() + relation.len() + 2;
            }
        }
        query
    }

    /// True when at least one schema triple survives the label and type
    /// filters. Empty filter lists match everything.
    fn verify_schema(
        &self,
        from_labels: &[String],
        relation_types: &[String],
        to_labels: &[String],
    ) -> bool {
        let clean = |labels: &[String]| -> Vec<String> {
            labels.iter().map(|l| l.trim_matches('`').to_string()).collect()
        };

        let mut valid: Vec<&RelationshipSchema> = self.schemas.iter().collect();
        if !from_labels.is_empty() {
            let from = clean(from_labels);
            valid.retain(|s| from.contains(&s.start));
        }
        if !to_labels.is_empty() {
            let to = clean(to_labels);
            valid.retain(|s| to.contains(&s.end));
        }
        if !relation_types.is_empty() {
            let types = clean(relation_types);
            valid.retain(|s| types.contains(&s.rel_type));
        }
        !valid.is_empty()
    }
}

fn clean_node(node: &str) -> String {
    let node = PROPERTY_PATTERN.replace_all(node, "");
    node.replace('(', "").replace(')', "").trim().to_string()
}

/// Map each node variable to the labels it was declared with anywhere in
/// the query.
fn detect_node_variables(query: &str) -> HashMap<String, Vec<String>> {
    let mut res: HashMap<String, Vec<String>> = HashMap::new();
    for m in NODE_PATTERN.find_iter(query) {
        let node = clean_node(m.as_str());
        let mut parts = node.split(':');
        let variable = parts.next().unwrap_or("").to_string();
        res.entry(variable)
            .or_default()
            .extend(parts.map(|p| p.to_string()));
    }
    res
}

fn extract_paths(query: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut idx = 0usize;
    while idx < query.len() {
        let m = match PATH_PATTERN.find(&query[idx..]) {
            Some(m) => m,
            None => break,
        };
        let mut matched = m.as_str();
        if let Some(pos) = matched.rfind(')') {
            matched = &matched[..pos + 1];
        }
        let next = match query.find(matched) {
            Some(found) => found + matched.len() - 1,
            None => break,
        };
        paths.push(matched.to_string());
        if next <= idx {
            break;
        }
        idx = next;
    }
    paths
}

fn judge_direction(relation: &str) -> Direction {
    let mut direction = Direction::Bidirectional;
    if relation.starts_with('<') {
        direction = Direction::Incoming;
    }
    if relation.ends_with('>') {
        direction = Direction::Outgoing;
    }
    direction
}

fn detect_labels(str_node: &str, node_variables: &HashMap<String, Vec<String>>) -> Vec<String> {
    let parts: Vec<&str> = str_node.split(':').collect();
    let variable = parts[0];
    if let Some(labels) = node_variables.get(variable) {
        labels.clone()
    } else if variable.is_empty() && parts.len() > 1 {
        parts[1..].iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    }
}

fn detect_relation_types(str_relation: &str) -> (Direction, Vec<String>) {
    let direction = judge_direction(str_relation);
    let types = match RELATION_TYPE_PATTERN
        .captures(str_relation)
        .and_then(|caps| caps.name("relation_type"))
    {
        Some(m) => m
            .as_str()
            .split('|')
            .map(|t| t.trim().trim_matches('!').to_string())
            .collect(),
        None => Vec::new(),
    };
    (direction, types)
}
