//! Bulk-load statement generation.
//!
//! Trait and MetaData nodes are built from tabular files with fixed column
//! sets, loaded server-side via `LOAD CSV WITH HEADERS`. Each file config
//! describes the nodes to MERGE (keyed by their first attribute) and, per
//! row-filter clause, the relationship triples to MERGE afterwards. One
//! statement per node build and one per relationship keeps edge failures
//! independently retryable and auditable.
//!
//! Attribute names ending in `_id` or `_num` are coerced to integers with
//! `toInt(...)`; everything else loads as text.

use serde::{Deserialize, Serialize};

/// A node label plus its attribute columns. The first attribute is the
/// MERGE key; the rest are set with `ON CREATE` / `ON MATCH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub label: String,
    pub attributes: Vec<String>,
}

impl NodeSpec {
    pub fn new(label: &str, attributes: &[&str]) -> Self {
        NodeSpec {
            label: label.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn var(&self) -> String {
        self.label.to_lowercase()
    }
}

/// An extra node matched by pattern rather than built from the row, e.g.
/// `predicate` -> `Term { uri: row.predicate }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    pub name: String,
    pub pattern: String,
}

/// The statements to run for rows satisfying one filter clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereBlock {
    /// Row filter, e.g. `1=1` or a blank/non-blank combination.
    pub clause: String,
    pub matches: Vec<MatchSpec>,
    /// `(subject, relationship, object)` triples, by variable name.
    pub merges: Vec<(String, String, String)>,
}

/// One bulk file: the nodes it builds and the relationships it merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvLoad {
    pub filename: String,
    pub nodes: Vec<NodeSpec>,
    pub wheres: Vec<WhereBlock>,
}

/// A rendered statement, tagged so executors can treat relationship merges
/// as best-effort while node builds stay fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatement {
    NodeBuild(String),
    EdgeMerge(String),
}

impl LoadStatement {
    pub fn text(&self) -> &str {
        match self {
            LoadStatement::NodeBuild(q) | LoadStatement::EdgeMerge(q) => q,
        }
    }
}

impl CsvLoad {
    /// Render all statements for this file, in execution order: node builds
    /// first, then relationship merges, per filter clause.
    pub fn statements(&self, base_url: &str) -> Vec<LoadStatement> {
        let mut out = Vec::new();
        for block in &self.wheres {
            let head = format!(
                "USING PERIODIC COMMIT LOAD CSV WITH HEADERS FROM '{}/{}' AS row \
                 WITH row WHERE {} ",
                base_url.trim_end_matches('/'),
                self.filename,
                block.clause
            );
            for node in &self.nodes {
                out.push(LoadStatement::NodeBuild(build_node(&head, node)));
            }
            for triple in &block.merges {
                out.push(LoadStatement::EdgeMerge(merge_triple(
                    &head, triple, &self.nodes, &block.matches,
                )));
            }
        }
        out
    }
}

/// Wrap a `row.<attr>` expression in `toInt` when the attribute name calls
/// for integer coercion.
pub fn autocast_val(attribute: &str) -> String {
    let expr = format!("row.{attribute}");
    if attribute.ends_with("_id") || attribute.ends_with("_num") {
        format!("toInt({expr})")
    } else {
        expr
    }
}

pub fn is_not_blank(field: &str) -> String {
    format!("({field} IS NOT NULL AND TRIM({field}) <> '')")
}

pub fn is_blank(field: &str) -> String {
    format!("({field} IS NULL OR TRIM({field}) = '')")
}

fn build_node(head: &str, node: &NodeSpec) -> String {
    let var = node.var();
    let mut attrs = node.attributes.iter();
    // First attribute is the merge key; a node spec with none is malformed
    // config and caught when the store rejects the empty pattern.
    let pk = attrs.next().map(String::as_str).unwrap_or("eol_pk");
    let mut q = format!("{head}MERGE ({var}:{} {{ {pk}: {} }})", node.label, autocast_val(pk));
    for attribute in attrs {
        let value = autocast_val(attribute);
        q.push_str(&format!("\nON CREATE SET {var}.{attribute} = {value}"));
        q.push_str(&format!("\nON MATCH SET {var}.{attribute} = {value}"));
    }
    q
}

fn merge_triple(
    head: &str,
    triple: &(String, String, String),
    nodes: &[NodeSpec],
    matches: &[MatchSpec],
) -> String {
    let (subj, pred, obj) = triple;
    let mut q = head.to_string();
    for node in nodes {
        let var = node.var();
        if var != *subj && var != *obj {
            continue;
        }
        let pk = node.attributes.first().map(String::as_str).unwrap_or("eol_pk");
        q.push_str(&format!("\nMATCH ({var}:{} {{ {pk}: {} }})", node.label, autocast_val(pk)));
    }
    for m in matches {
        if m.name != *subj && m.name != *obj {
            continue;
        }
        q.push_str(&format!("\nMATCH ({}:{})", m.name, m.pattern));
    }
    q.push_str(&format!("\nMERGE ({subj})-[:{pred}]->({obj})"));
    q
}

/// Config for a resource's trait file (`traits_<id>.csv`).
pub fn trait_file_config(resource_id: i64) -> CsvLoad {
    CsvLoad {
        filename: format!("traits_{resource_id}.csv"),
        nodes: vec![
            NodeSpec::new("Page", &["page_id"]),
            NodeSpec::new(
                "Trait",
                &[
                    "eol_pk",
                    "resource_pk",
                    "sex",
                    "lifestage",
                    "statistical_method",
                    "source",
                    "value_literal",
                    "value_num",
                    "object_page_id",
                    "scientific_name",
                ],
            ),
        ],
        wheres: vec![
            WhereBlock {
                clause: "1=1".into(),
                matches: vec![
                    MatchSpec {
                        name: "predicate".into(),
                        pattern: "Term { uri: row.predicate }".into(),
                    },
                    MatchSpec {
                        name: "resource".into(),
                        pattern: format!("Resource {{ resource_id: {resource_id} }}"),
                    },
                ],
                merges: vec![
                    ("page".into(), "trait".into(), "trait".into()),
                    ("trait".into(), "predicate".into(), "predicate".into()),
                    ("trait".into(), "supplier".into(), "resource".into()),
                ],
            },
            WhereBlock {
                clause: format!("{} AND {}", is_blank("row.value_uri"), is_not_blank("row.units")),
                matches: vec![MatchSpec {
                    name: "units".into(),
                    pattern: "Term { uri: row.units }".into(),
                }],
                merges: vec![("trait".into(), "units_term".into(), "units".into())],
            },
            WhereBlock {
                clause: format!("{} AND {}", is_not_blank("row.value_uri"), is_blank("row.units")),
                matches: vec![MatchSpec {
                    name: "object_term".into(),
                    pattern: "Term { uri: row.value_uri }".into(),
                }],
                merges: vec![("trait".into(), "object_term".into(), "object_term".into())],
            },
        ],
    }
}

/// Config for a resource's metadata file (`meta_traits_<id>.csv`).
pub fn meta_file_config(resource_id: i64) -> CsvLoad {
    CsvLoad {
        filename: format!("meta_traits_{resource_id}.csv"),
        nodes: vec![NodeSpec::new(
            "MetaData",
            &[
                "eol_pk",
                "sex",
                "lifestage",
                "statistical_method",
                "source",
                "value_literal",
                "value_num",
            ],
        )],
        wheres: vec![
            WhereBlock {
                clause: "1=1".into(),
                matches: vec![
                    MatchSpec {
                        name: "trait".into(),
                        pattern: "Trait { eol_pk: row.trait_eol_pk }".into(),
                    },
                    MatchSpec {
                        name: "predicate".into(),
                        pattern: "Term { uri: row.predicate }".into(),
                    },
                ],
                merges: vec![
                    ("trait".into(), "metadata".into(), "metadata".into()),
                    ("metadata".into(), "predicate".into(), "predicate".into()),
                ],
            },
            WhereBlock {
                clause: format!("{} AND {}", is_blank("row.value_uri"), is_not_blank("row.units")),
                matches: vec![MatchSpec {
                    name: "units".into(),
                    pattern: "Term { uri: row.units }".into(),
                }],
                merges: vec![("metadata".into(), "units_term".into(), "units".into())],
            },
            WhereBlock {
                clause: format!("{} AND {}", is_not_blank("row.value_uri"), is_blank("row.units")),
                matches: vec![MatchSpec {
                    name: "object_term".into(),
                    pattern: "Term { uri: row.value_uri }".into(),
                }],
                merges: vec![("metadata".into(), "object_term".into(), "object_term".into())],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autocast_coerces_id_and_num_columns() {
        assert_eq!(autocast_val("page_id"), "toInt(row.page_id)");
        assert_eq!(autocast_val("value_num"), "toInt(row.value_num)");
        assert_eq!(autocast_val("value_literal"), "row.value_literal");
        assert_eq!(autocast_val("identity"), "row.identity");
    }

    #[test]
    fn node_build_merges_on_first_attribute() {
        let load = trait_file_config(40);
        let stmts = load.statements("https://eol.org");
        let first = match &stmts[0] {
            LoadStatement::NodeBuild(q) => q,
            other => panic!("expected node build, got {other:?}"),
        };
        assert!(first.contains("FROM 'https://eol.org/traits_40.csv' AS row"));
        assert!(first.contains("MERGE (page:Page { page_id: toInt(row.page_id) })"));

        let trait_build = stmts[1].text();
        assert!(trait_build.contains("MERGE (trait:Trait { eol_pk: row.eol_pk })"));
        assert!(trait_build.contains("ON CREATE SET trait.resource_pk = row.resource_pk"));
        assert!(trait_build.contains("ON MATCH SET trait.object_page_id = toInt(row.object_page_id)"));
    }

    #[test]
    fn edge_merges_match_their_endpoints_only() {
        let load = trait_file_config(40);
        let stmts = load.statements("https://eol.org");
        let supplier = stmts
            .iter()
            .filter_map(|s| match s {
                LoadStatement::EdgeMerge(q) if q.contains(":supplier") => Some(q),
                _ => None,
            })
            .next()
            .unwrap();
        assert!(supplier.contains("MATCH (trait:Trait { eol_pk: row.eol_pk })"));
        assert!(supplier.contains("MATCH (resource:Resource { resource_id: 40 })"));
        assert!(!supplier.contains("(page:Page"));
        assert!(supplier.ends_with("MERGE (trait)-[:supplier]->(resource)"));
    }

    #[test]
    fn conditional_blocks_guard_units_and_object_terms() {
        let load = meta_file_config(7);
        let stmts = load.statements("https://eol.org");
        let units = stmts
            .iter()
            .find(|s| s.text().contains(":units_term"))
            .unwrap();
        assert!(units
            .text()
            .contains("(row.value_uri IS NULL OR TRIM(row.value_uri) = '') AND (row.units IS NOT NULL AND TRIM(row.units) <> '')"));
        assert!(matches!(units, LoadStatement::EdgeMerge(_)));
    }
}
