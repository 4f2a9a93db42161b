//! Gradient-boosted tree ensembles in XGBoost's JSON model format.
//!
//! Reads the document written by `Booster.save_model("model.json")` and
//! evaluates it natively. Only the parts needed for inference are
//! deserialized:
//!
//! ```text
//! learner
//! ├── feature_names             optional, checked against the extractor
//! ├── learner_model_param
//! │   └── base_score            "5E-1" or "[5E-1]"
//! ├── objective.name            selects the link function
//! └── gradient_booster (gbtree)
//!     └── model.trees[]         parallel arrays per tree
//! ```
//!
//! A tree is stored as parallel arrays indexed by node id. A node whose
//! `left_children` entry is `-1` is a leaf, and its value sits in
//! `split_conditions`. Split nodes send `x < threshold` left and missing
//! (NaN) values in the `default_left` direction.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::features::{FEATURE_COUNT, FEATURE_NAMES};
use crate::forecast::Regressor;

#[derive(Deserialize)]
struct ModelFile {
    learner: RawLearner,
}

#[derive(Deserialize)]
struct RawLearner {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: RawBooster,
    learner_model_param: RawModelParam,
    objective: RawObjective,
}

#[derive(Deserialize)]
struct RawBooster {
    name: String,
    #[serde(default)]
    model: Option<RawTreeModel>,
}

#[derive(Deserialize)]
struct RawTreeModel {
    trees: Vec<RawTree>,
}

#[derive(Deserialize)]
struct RawTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
}

#[derive(Deserialize)]
struct RawModelParam {
    base_score: String,
    #[serde(default)]
    num_class: Option<String>,
}

#[derive(Deserialize)]
struct RawObjective {
    name: String,
}

/// `default_left` is written as integers by older releases and booleans by newer ones.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

/// Inverse link applied to the summed margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Identity,
    Logistic,
    Log,
}

impl Link {
    fn for_objective(name: &str) -> Result<Self> {
        match name {
            "reg:squarederror" | "reg:linear" | "reg:squaredlogerror" | "reg:absoluteerror"
            | "reg:pseudohubererror" | "reg:quantileerror" => Ok(Link::Identity),
            "reg:logistic" | "binary:logistic" => Ok(Link::Logistic),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Ok(Link::Log),
            other => bail!("unsupported objective: {}", other),
        }
    }

    /// Map a user-facing base score into margin space.
    fn to_margin(self, base_score: f32) -> f32 {
        match self {
            Link::Identity => base_score,
            Link::Logistic => (base_score / (1.0 - base_score)).ln(),
            Link::Log => base_score.ln(),
        }
    }

    fn apply(self, margin: f32) -> f32 {
        match self {
            Link::Identity => margin,
            Link::Logistic => 1.0 / (1.0 + (-margin).exp()),
            Link::Log => margin.exp(),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_raw(raw: &RawTree, index: usize) -> Result<Self> {
        let n = raw.left_children.len();
        if n == 0 {
            bail!("tree {} has no nodes", index);
        }
        if raw.right_children.len() != n
            || raw.split_indices.len() != n
            || raw.split_conditions.len() != n
            || raw.default_left.len() != n
        {
            bail!("tree {} has mismatched node arrays", index);
        }

        let mut nodes = Vec::with_capacity(n);
        for id in 0..n {
            let left = raw.left_children[id];
            if left == -1 {
                nodes.push(Node::Leaf(raw.split_conditions[id]));
                continue;
            }
            let right = raw.right_children[id];
            // Children always follow their parent, which guarantees traversal ends.
            for child in [left, right] {
                if child <= id as i64 || child >= n as i64 {
                    bail!("tree {} node {} has invalid child {}", index, id, child);
                }
            }
            let feature = raw.split_indices[id];
            if feature < 0 || feature as usize >= FEATURE_COUNT {
                bail!(
                    "tree {} node {} splits on feature {} (model expects {} features)",
                    index,
                    id,
                    feature,
                    FEATURE_COUNT
                );
            }
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: raw.split_conditions[id],
                left: left as usize,
                right: right as usize,
                default_left: raw.default_left[id].is_set(),
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, row: &[f32; FEATURE_COUNT]) -> f32 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = row[*feature];
                    id = if x.is_nan() {
                        if *default_left {
                            *left
                        } else {
                            *right
                        }
                    } else if x < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// A loaded, immutable tree ensemble.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    trees: Vec<Tree>,
    base_margin: f32,
    link: Link,
}

impl GradientBoostedTrees {
    /// Load a model file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to load model file: {}", path.display()))
    }

    /// Parse a model from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ModelFile = serde_json::from_str(json).context("Invalid model JSON")?;
        let learner = file.learner;

        if learner.gradient_booster.name != "gbtree" {
            bail!(
                "unsupported booster '{}': only gbtree is supported",
                learner.gradient_booster.name
            );
        }

        let num_class = learner
            .learner_model_param
            .num_class
            .as_deref()
            .unwrap_or("0")
            .parse::<u32>()
            .context("Invalid num_class")?;
        if num_class > 1 {
            bail!("multi-class models are not supported (num_class = {})", num_class);
        }

        if !learner.feature_names.is_empty() && learner.feature_names != FEATURE_NAMES {
            bail!(
                "model features {:?} do not match expected {:?}",
                learner.feature_names,
                FEATURE_NAMES
            );
        }

        let link = Link::for_objective(&learner.objective.name)?;
        let base_score = parse_base_score(&learner.learner_model_param.base_score)?;

        let raw_trees = learner
            .gradient_booster
            .model
            .ok_or_else(|| anyhow::anyhow!("gbtree model section missing"))?
            .trees;
        let trees = raw_trees
            .iter()
            .enumerate()
            .map(|(i, t)| Tree::from_raw(t, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            trees,
            base_margin: link.to_margin(base_score),
            link,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn predict_row(&self, row: &[f32; FEATURE_COUNT]) -> f32 {
        let margin = self
            .trees
            .iter()
            .fold(self.base_margin, |acc, tree| acc + tree.leaf_value(row));
        self.link.apply(margin)
    }
}

impl Regressor for GradientBoostedTrees {
    fn predict(&self, rows: &[[f32; FEATURE_COUNT]]) -> Result<Vec<f32>> {
        Ok(rows.iter().map(|row| self.predict_row(row)).collect())
    }
}

fn parse_base_score(raw: &str) -> Result<f32> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    trimmed
        .parse::<f32>()
        .with_context(|| format!("Invalid base_score: '{}'", raw))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two stumps: hour < 12 → 1.5 else 3.0; day_of_week < 5 → 0.5 else -0.25.
    pub(crate) const TWO_STUMPS: &str = r#"{
      "learner": {
        "feature_names": ["hour", "day_of_week", "day_of_month", "month"],
        "gradient_booster": {
          "name": "gbtree",
          "model": {
            "trees": [
              {
                "left_children": [1, -1, -1],
                "right_children": [2, -1, -1],
                "split_indices": [0, 0, 0],
                "split_conditions": [12.0, 1.5, 3.0],
                "default_left": [1, 0, 0]
              },
              {
                "left_children": [1, -1, -1],
                "right_children": [2, -1, -1],
                "split_indices": [1, 0, 0],
                "split_conditions": [5.0, 0.5, -0.25],
                "default_left": [false, false, false]
              }
            ]
          }
        },
        "learner_model_param": { "base_score": "5E-1", "num_class": "0", "num_feature": "4" },
        "objective": { "name": "reg:squarederror" }
      },
      "version": [2, 0, 3]
    }"#;

    #[test]
    fn test_sum_of_leaves_plus_base() {
        let model = GradientBoostedTrees::from_json_str(TWO_STUMPS).unwrap();
        assert_eq!(model.num_trees(), 2);
        assert_eq!(model.predict_row(&[10.0, 0.0, 15.0, 1.0]), 2.5);
        assert_eq!(model.predict_row(&[14.0, 6.0, 20.0, 1.0]), 3.25);
    }

    #[test]
    fn test_threshold_is_strict_less_than() {
        let model = GradientBoostedTrees::from_json_str(TWO_STUMPS).unwrap();
        // hour == 12 goes right (3.0), dow == 5 goes right (-0.25)
        assert_eq!(model.predict_row(&[12.0, 5.0, 1.0, 1.0]), 3.25);
    }

    #[test]
    fn test_missing_follows_default_direction() {
        let model = GradientBoostedTrees::from_json_str(TWO_STUMPS).unwrap();
        // hour NaN → default left (1.5); dow NaN → default right (-0.25)
        assert_eq!(model.predict_row(&[f32::NAN, f32::NAN, 1.0, 1.0]), 1.75);
    }

    #[test]
    fn test_bracketed_base_score() {
        let json = TWO_STUMPS.replace("\"5E-1\"", "\"[1E0]\"");
        let model = GradientBoostedTrees::from_json_str(&json).unwrap();
        assert_eq!(model.predict_row(&[10.0, 0.0, 15.0, 1.0]), 3.0);
    }

    #[test]
    fn test_logistic_link() {
        let json = TWO_STUMPS
            .replace("reg:squarederror", "reg:logistic")
            .replace("[12.0, 1.5, 3.0]", "[12.0, 0.0, 0.0]")
            .replace("[5.0, 0.5, -0.25]", "[5.0, 0.0, 0.0]");
        let model = GradientBoostedTrees::from_json_str(&json).unwrap();
        assert_eq!(model.link(), Link::Logistic);
        let p = model.predict_row(&[1.0, 1.0, 1.0, 1.0]);
        assert!((p - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_poisson_link() {
        let json = TWO_STUMPS
            .replace("reg:squarederror", "count:poisson")
            .replace("\"5E-1\"", "\"1E0\"")
            .replace("[12.0, 1.5, 3.0]", "[12.0, 0.0, 0.0]")
            .replace("[5.0, 0.5, -0.25]", "[5.0, 0.0, 0.0]");
        let model = GradientBoostedTrees::from_json_str(&json).unwrap();
        let p = model.predict_row(&[1.0, 1.0, 1.0, 1.0]);
        assert!((p - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_mismatched_features() {
        let json = TWO_STUMPS.replace("\"month\"]", "\"minute\"]");
        let err = GradientBoostedTrees::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn test_rejects_out_of_range_split_feature() {
        let json = TWO_STUMPS.replace("\"split_indices\": [1, 0, 0]", "\"split_indices\": [7, 0, 0]");
        assert!(GradientBoostedTrees::from_json_str(&json).is_err());
    }

    #[test]
    fn test_rejects_backward_child() {
        let json = TWO_STUMPS.replacen("\"left_children\": [1, -1, -1]", "\"left_children\": [0, -1, -1]", 1);
        assert!(GradientBoostedTrees::from_json_str(&json).is_err());
    }

    #[test]
    fn test_rejects_dart_booster() {
        let json = TWO_STUMPS.replace("\"name\": \"gbtree\"", "\"name\": \"dart\"");
        let err = GradientBoostedTrees::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("dart"));
    }

    #[test]
    fn test_rejects_multiclass() {
        let json = TWO_STUMPS.replace("\"num_class\": \"0\"", "\"num_class\": \"3\"");
        assert!(GradientBoostedTrees::from_json_str(&json).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(GradientBoostedTrees::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = GradientBoostedTrees::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read model file"));
    }
}
