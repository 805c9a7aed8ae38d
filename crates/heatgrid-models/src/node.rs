use std::fmt;

macro_rules! arena_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(usize);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index)
            }

            /// Zero-based position.
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_index!(
    /// Column of the feature matrix a split or hinge reads.
    FeatureIndex
);

arena_index!(
    /// Position of a node in a tree's `Vec<Node>` arena.
    NodeIndex
);

/// One node of a least-squares regression tree.
///
/// The root is arena position 0; children always sit after their parent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// Rows with `feature <= threshold` go left, the rest go right.
    Split {
        feature: FeatureIndex,
        threshold: f64,
        left: NodeIndex,
        right: NodeIndex,
        /// Training rows routed through this node.
        n_samples: usize,
        /// Drop in the sum of squared errors from parent to children.
        impurity_decrease: f64,
    },
    /// Predicts the mean training target of the rows that reached it.
    Leaf { value: f64, n_samples: usize },
}

impl Node {
    /// Training rows that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Left and right children of a split, `None` for a leaf.
    #[must_use]
    pub fn children(&self) -> Option<(NodeIndex, NodeIndex)> {
        match self {
            Node::Split { left, right, .. } => Some((*left, *right)),
            Node::Leaf { .. } => None,
        }
    }

    /// Where `sample` goes next: the leaf value, or the child to descend into.
    pub(crate) fn route(&self, sample: &[f64]) -> Result<f64, NodeIndex> {
        match self {
            Node::Leaf { value, .. } => Ok(*value),
            Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => Err(if sample[feature.index()] <= *threshold {
                *left
            } else {
                *right
            }),
        }
    }
}
