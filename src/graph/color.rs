use crate::graph::regroup::Node;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub const OTHER_COLOR: &str = "#999999";

/// Salts tried before a hashed color is accepted despite colliding.
const MAX_SALTS: u32 = 32;

/// Canonical colors for well-known venues.
const BUILTIN_PALETTE: &[(&str, &str)] = &[
    ("Uniswap", "#ff007a"),
    ("Uniswap X", "#fc72ff"),
    ("1inch", "#1b314f"),
    ("CoW Swap", "#052b65"),
    ("Metamask", "#f6851b"),
    ("0x", "#231f20"),
    ("Matcha", "#30b37c"),
    ("Paraswap", "#0058ff"),
    ("Kyberswap", "#31cb9e"),
    ("Odos", "#6b44ff"),
    ("Rabby", "#7084ff"),
    ("Phantom", "#ab9ff2"),
    ("Bebop", "#ffd200"),
    ("Flashbots", "#1c1c1c"),
    ("MEV Blocker", "#ee4a23"),
    ("beaverbuild", "#6ed2c3"),
    ("Titan", "#e0b03c"),
    ("rsync", "#4286f4"),
];

/// How labels without a canonical color are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackColor {
    /// Derived from the label's SHA-256, stable across requests.
    #[default]
    Hashed,
    /// Uniformly random on every request.
    Random,
}

/// True for 7-character `#rrggbb` strings.
pub fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Assigns a display color to every node of a graph.
///
/// # Examples
///
/// ```
/// use sankey_engine::graph::color::{ColorAssigner, FallbackColor};
/// use sankey_engine::graph::regroup::Node;
/// use sankey_engine::core::column::EntityColumn;
///
/// let frontend = EntityColumn::new("frontend");
/// let nodes = vec![
///     Node { column: frontend.clone(), label: "Uniswap".into(), is_other: false },
///     Node { column: frontend.clone(), label: "Other (frontend)".into(), is_other: true },
/// ];
/// let colors = ColorAssigner::new(FallbackColor::Hashed).assign(&nodes);
/// assert_eq!(colors, vec!["#ff007a", "#999999"]);
/// ```
#[derive(Debug, Clone)]
pub struct ColorAssigner {
    palette: HashMap<String, String>,
    other_color: String,
    fallback: FallbackColor,
}

impl Default for ColorAssigner {
    fn default() -> Self {
        Self::new(FallbackColor::default())
    }
}

impl ColorAssigner {
    /// Built-in palette, grey Other buckets.
    pub fn new(fallback: FallbackColor) -> Self {
        Self {
            palette: BUILTIN_PALETTE
                .iter()
                .map(|(label, color)| (label.to_string(), color.to_string()))
                .collect(),
            other_color: OTHER_COLOR.to_string(),
            fallback,
        }
    }

    /// Add or override canonical colors. Malformed colors are skipped.
    pub fn with_palette<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (label, color) in entries {
            let (label, color) = (label.into(), color.into());
            if is_hex_color(&color) {
                self.palette.insert(label, color.to_ascii_lowercase());
            } else {
                log::warn!("ignoring palette color {:?} for {:?}", color, label);
            }
        }
        self
    }

    pub fn with_other_color(mut self, color: impl Into<String>) -> Self {
        let color = color.into();
        if is_hex_color(&color) {
            self.other_color = color.to_ascii_lowercase();
        } else {
            log::warn!("ignoring Other color {:?}", color);
        }
        self
    }

    pub fn fallback(&self) -> FallbackColor {
        self.fallback
    }

    pub fn canonical(&self, label: &str) -> Option<&str> {
        self.palette.get(label).map(|c| c.as_str())
    }

    /// Palette or Other color of a node, if it has a fixed one.
    fn fixed(&self, node: &Node) -> Option<&str> {
        if node.is_other {
            Some(self.other_color.as_str())
        } else {
            self.canonical(&node.label)
        }
    }

    /// One color per node, in node order.
    ///
    /// Hashed fallbacks avoid every fixed color present in the response,
    /// wherever it appears in node order.
    pub fn assign(&self, nodes: &[Node]) -> Vec<String> {
        let mut used: HashSet<String> = nodes
            .iter()
            .filter_map(|node| self.fixed(node))
            .map(str::to_string)
            .collect();
        let mut colors = Vec::with_capacity(nodes.len());

        for node in nodes {
            let color = match self.fixed(node) {
                Some(fixed) => fixed.to_string(),
                None => match self.fallback {
                    FallbackColor::Hashed => hashed_color(&node.label, &used),
                    FallbackColor::Random => random_color(),
                },
            };
            used.insert(color.clone());
            colors.push(color);
        }
        colors
    }
}

fn hashed_color(label: &str, used: &HashSet<String>) -> String {
    let mut color = String::new();
    for salt in 0..MAX_SALTS {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        if salt > 0 {
            hasher.update(salt.to_be_bytes());
        }
        let digest = hasher.finalize();
        color = format!("#{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2]);
        if !used.contains(&color) {
            break;
        }
    }
    color
}

fn random_color() -> String {
    format!("#{:06x}", rand::thread_rng().gen_range(0..=0xff_ffffu32))
}
