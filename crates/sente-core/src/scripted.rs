//! A position walking an explicit, hand-built game tree.

use std::sync::Arc;

use crate::{Color, Move, MoveList, Position, Repetition, Score};

#[derive(Debug, Default)]
struct Node {
    children: Vec<(Move, usize)>,
    /// Evaluation from the side to move's point of view.
    eval: Score,
    in_check: bool,
    declared_win: bool,
    /// Evaluating this node panics.
    faulty: bool,
}

/// Builds a [`ScriptedPosition`] node by node. Node 0 is the root.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub const ROOT: usize = 0;

    pub fn new() -> TreeBuilder {
        TreeBuilder {
            nodes: vec![Node::default()],
        }
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Add a node evaluated at `eval` for its side to move.
    pub fn node(&mut self, eval: Score) -> usize {
        self.push(Node {
            eval,
            ..Node::default()
        })
    }

    /// Add a node whose side to move is in check. Without children it is mate.
    pub fn checked(&mut self, eval: Score) -> usize {
        self.push(Node {
            eval,
            in_check: true,
            ..Node::default()
        })
    }

    /// Add a node whose side to move is in check and has no reply.
    pub fn mated(&mut self) -> usize {
        self.checked(0)
    }

    /// Add a node whose evaluation panics.
    pub fn faulty(&mut self) -> usize {
        self.push(Node {
            faulty: true,
            ..Node::default()
        })
    }

    pub fn edge(&mut self, from: usize, mv: Move, to: usize) -> &mut TreeBuilder {
        self.nodes[from].children.push((mv, to));
        self
    }

    pub fn set_eval(&mut self, node: usize, eval: Score) -> &mut TreeBuilder {
        self.nodes[node].eval = eval;
        self
    }

    pub fn declare_win(&mut self, node: usize) -> &mut TreeBuilder {
        self.nodes[node].declared_win = true;
        self
    }

    pub fn build(self) -> ScriptedPosition {
        ScriptedPosition {
            tree: Arc::new(self.nodes),
            path: vec![Step {
                node: Self::ROOT,
                key: mix(ROOT_KEY),
            }],
            side: Color::Black,
        }
    }
}

const ROOT_KEY: u64 = 0x2545_F491_4F6C_DD1D;
const NULL_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// SplitMix64 finalizer.
const fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, Copy)]
struct Step {
    node: usize,
    /// Fingerprint of the path leading here.
    key: u64,
}

/// A position walking an explicit tree. Null moves keep the node and flip
/// the side, so the same children follow.
///
/// Positions are identified by the path that reached them: there are no
/// transpositions and no repetitions, even when edges point back to earlier
/// nodes.
#[derive(Debug, Clone)]
pub struct ScriptedPosition {
    tree: Arc<Vec<Node>>,
    path: Vec<Step>,
    side: Color,
}

impl ScriptedPosition {
    fn top(&self) -> Step {
        self.path.last().copied().unwrap_or(Step {
            node: TreeBuilder::ROOT,
            key: mix(ROOT_KEY),
        })
    }

    fn current(&self) -> &Node {
        &self.tree[self.top().node]
    }

    fn child(&self, mv: Move) -> Option<usize> {
        self.current()
            .children
            .iter()
            .find(|&&(m, _)| m == mv)
            .map(|&(_, child)| child)
    }

    /// Index of the node the position stands on.
    pub fn node(&self) -> usize {
        self.top().node
    }
}

impl Position for ScriptedPosition {
    type Undo = ();

    fn side_to_move(&self) -> Color {
        self.side
    }

    fn key(&self) -> u64 {
        self.top().key
    }

    fn game_ply(&self) -> u32 {
        (self.path.len() - 1) as u32
    }

    fn legal_moves(&self, moves: &mut MoveList) {
        for &(mv, _) in &self.current().children {
            moves.push(mv);
        }
    }

    fn make_move(&mut self, mv: Move) {
        let child = self.child(mv).unwrap_or_else(|| panic!("{mv} is not a move here"));
        let key = mix(self.top().key ^ u64::from(mv.raw()));
        self.path.push(Step { node: child, key });
        self.side = !self.side;
    }

    fn unmake_move(&mut self, _mv: Move, _undo: ()) {
        self.path.pop();
        self.side = !self.side;
    }

    fn make_null_move(&mut self) {
        let top = self.top();
        self.path.push(Step {
            node: top.node,
            key: mix(top.key ^ NULL_SALT),
        });
        self.side = !self.side;
    }

    fn unmake_null_move(&mut self, _undo: ()) {
        self.path.pop();
        self.side = !self.side;
    }

    fn in_check(&self) -> bool {
        self.current().in_check
    }

    fn gives_check(&self, mv: Move) -> bool {
        self.child(mv).is_some_and(|child| self.tree[child].in_check)
    }

    fn evaluate(&mut self) -> Score {
        let node = self.current();
        if node.faulty {
            panic!("evaluation failed at node {}", self.node());
        }
        node.eval
    }

    fn repetition(&self, _max_back: usize) -> Repetition {
        Repetition::None
    }

    fn see(&self, _mv: Move) -> Score {
        0
    }

    fn declared_win(&self) -> bool {
        self.current().declared_win
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PieceKind, Square};

    fn drop_at(sq: &str) -> Move {
        Move::new_drop(PieceKind::Pawn, Square::from_usi(sq).unwrap())
    }

    #[test]
    fn walks_edges_and_back() {
        let mut tree = TreeBuilder::new();
        let child = tree.node(40);
        tree.edge(TreeBuilder::ROOT, drop_at("5e"), child);
        let mut pos = tree.build();
        let root_key = pos.key();

        pos.make_move(drop_at("5e"));
        assert_eq!(pos.node(), child);
        assert_eq!(pos.evaluate(), 40);
        assert_eq!(pos.side_to_move(), Color::White);
        pos.unmake_move(drop_at("5e"), ());
        assert_eq!(pos.key(), root_key);
    }

    #[test]
    fn null_move_changes_the_key() {
        let mut pos = TreeBuilder::new().build();
        let root_key = pos.key();
        pos.make_null_move();
        assert_ne!(pos.key(), root_key);
        assert_eq!(pos.node(), TreeBuilder::ROOT);
        pos.unmake_null_move(());
        assert_eq!(pos.key(), root_key);
    }

    #[test]
    fn paths_to_the_same_node_differ() {
        let mut tree = TreeBuilder::new();
        let child = tree.node(0);
        tree.edge(TreeBuilder::ROOT, drop_at("5e"), child)
            .edge(TreeBuilder::ROOT, drop_at("4e"), child);
        let mut pos = tree.build();

        pos.make_move(drop_at("5e"));
        let first = pos.key();
        pos.unmake_move(drop_at("5e"), ());
        pos.make_move(drop_at("4e"));
        assert_eq!(pos.node(), child);
        assert_ne!(pos.key(), first);
    }

    #[test]
    #[should_panic(expected = "evaluation failed")]
    fn faulty_node_panics_on_evaluate() {
        let mut tree = TreeBuilder::new();
        let bad = tree.faulty();
        tree.edge(TreeBuilder::ROOT, drop_at("1a"), bad);
        let mut pos = tree.build();
        pos.make_move(drop_at("1a"));
        pos.evaluate();
    }
}
