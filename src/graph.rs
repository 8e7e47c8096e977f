//! Synthetic coordination graph: node population from run signals and a
//! bouncing animation with proximity edges.

use crate::oracle::uniform;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

pub const TOTAL_NODES: u32 = 15;
pub const SPAWN_MARGIN: f64 = 60.0;
pub const STRONG_EDGE_DISTANCE: f64 = 180.0;
pub const WEAK_EDGE_DISTANCE: f64 = 120.0;
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeClass { Verified, Suspicious, Bot }

impl NodeClass {
    pub fn radius_range(&self) -> (f64, f64) {
        match self {
            NodeClass::Verified => (10.0, 14.0),
            NodeClass::Suspicious => (12.0, 18.0),
            NodeClass::Bot => (8.0, 12.0),
        }
    }

    /// Largest absolute velocity component at spawn.
    pub fn max_speed(&self) -> f64 {
        match self {
            NodeClass::Verified => 0.3,
            NodeClass::Suspicious => 0.4,
            NodeClass::Bot => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphNode {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub class: NodeClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub verified: u32,
    pub suspicious: u32,
    pub bot: u32,
}

impl NodeCounts {
    /// Bots take precedence, then suspicious nodes; verified nodes fill the
    /// remainder so the total is always [`TOTAL_NODES`].
    pub fn from_signals(bot_percentage: u32, coord_score: f64) -> Self {
        let bot = ((bot_percentage as f64 / 100.0) * TOTAL_NODES as f64).floor() as u32;
        let bot = bot.min(TOTAL_NODES);
        let suspicious = ((coord_score * 5.0).floor().max(0.0) as u32).min(TOTAL_NODES - bot);
        Self { verified: TOTAL_NODES - bot - suspicious, suspicious, bot }
    }

    pub fn total(&self) -> u32 { self.verified + self.suspicious + self.bot }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasSize {
    fn default() -> Self { Self { width: 600.0, height: 400.0 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphCaption {
    pub total_accounts: u32,
    pub bot_percentage: u32,
    pub coord_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    pub distance: f64,
    pub opacity: f64,
    /// Both endpoints are non-verified.
    pub strong: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub seq: u64,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Edge>,
    pub caption: GraphCaption,
}

/// Pure animation state; no timers here.
#[derive(Debug, Clone)]
pub struct GraphModel {
    nodes: Vec<GraphNode>,
    canvas: CanvasSize,
    caption: GraphCaption,
}

impl GraphModel {
    pub fn generate<R: Rng + ?Sized>(counts: NodeCounts, canvas: CanvasSize, caption: GraphCaption, rng: &mut R) -> Self {
        let mut nodes = Vec::with_capacity(counts.total() as usize);
        for (class, n) in [(NodeClass::Verified, counts.verified), (NodeClass::Suspicious, counts.suspicious), (NodeClass::Bot, counts.bot)] {
            for _ in 0..n {
                nodes.push(spawn_node(class, canvas, rng));
            }
        }
        Self { nodes, canvas, caption }
    }

    pub fn from_nodes(nodes: Vec<GraphNode>, canvas: CanvasSize, caption: GraphCaption) -> Self {
        Self { nodes, canvas, caption }
    }

    pub fn nodes(&self) -> &[GraphNode] { &self.nodes }

    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for i in 0..self.nodes.len() {
            for j in (i + 1)..self.nodes.len() {
                let (a, b) = (&self.nodes[i], &self.nodes[j]);
                let distance = (a.x - b.x).hypot(a.y - b.y);
                let strong = a.class != NodeClass::Verified && b.class != NodeClass::Verified;
                let max = if strong { STRONG_EDGE_DISTANCE } else { WEAK_EDGE_DISTANCE };
                if distance < max {
                    let base = if strong { 0.3 } else { 0.2 };
                    edges.push(Edge { a: i, b: j, distance, opacity: (base - distance / 600.0).max(0.0), strong });
                }
            }
        }
        edges
    }

    /// Moves every node by its velocity, reflecting off the canvas edges.
    pub fn step(&mut self) {
        let CanvasSize { width, height } = self.canvas;
        for n in &mut self.nodes {
            n.x += n.vx;
            n.y += n.vy;
            if (n.x - n.radius < 0.0 && n.vx < 0.0) || (n.x + n.radius > width && n.vx > 0.0) {
                n.vx = -n.vx;
            }
            if (n.y - n.radius < 0.0 && n.vy < 0.0) || (n.y + n.radius > height && n.vy > 0.0) {
                n.vy = -n.vy;
            }
        }
    }

    pub fn snapshot(&self, seq: u64) -> Frame {
        Frame { seq, nodes: self.nodes.clone(), edges: self.edges(), caption: self.caption }
    }

    /// Draw then move, as one animation tick.
    pub fn tick(&mut self, seq: u64) -> Frame {
        let frame = self.snapshot(seq);
        self.step();
        frame
    }
}

fn spawn_node<R: Rng + ?Sized>(class: NodeClass, canvas: CanvasSize, rng: &mut R) -> GraphNode {
    let span = |len: f64| {
        let margin = SPAWN_MARGIN.min(len / 2.0);
        (margin, len - margin)
    };
    let (x0, x1) = span(canvas.width);
    let (y0, y1) = span(canvas.height);
    let (r0, r1) = class.radius_range();
    let v = class.max_speed();
    GraphNode {
        x: uniform(rng, x0, x1),
        y: uniform(rng, y0, y1),
        vx: uniform(rng, -v, v),
        vy: uniform(rng, -v, v),
        radius: uniform(rng, r0, r1),
        class,
    }
}

/// A running animation. Frames are published to a watch channel; dropping
/// every handle also ends the loop.
#[derive(Debug)]
pub struct AnimationHandle {
    id: u64,
    frames: watch::Receiver<Frame>,
    task: AbortHandle,
}

impl AnimationHandle {
    pub fn id(&self) -> u64 { self.id }

    pub fn latest(&self) -> Frame { self.frames.borrow().clone() }

    /// Waits for the next published frame. `None` once the loop has ended.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.changed().await.ok()?;
        Some(self.frames.borrow_and_update().clone())
    }

    pub fn is_finished(&self) -> bool { self.task.is_finished() }
}

/// Owns the single active animation loop.
pub struct GraphSimulator {
    frame_interval: Duration,
    next_id: AtomicU64,
    active: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl Default for GraphSimulator {
    fn default() -> Self { Self::new(FRAME_INTERVAL) }
}

impl GraphSimulator {
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval, next_id: AtomicU64::new(1), active: Mutex::new(None) }
    }

    pub fn render<R: Rng + ?Sized>(&self, counts: NodeCounts, canvas: CanvasSize, caption: GraphCaption, rng: &mut R) -> AnimationHandle {
        self.start(GraphModel::generate(counts, canvas, caption, rng))
    }

    /// Cancels any running loop, then starts `model` on a fresh one.
    pub fn start(&self, mut model: GraphModel) -> AnimationHandle {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((prev, task)) = active.take() {
            task.abort();
            debug!(animation = prev, "superseded graph animation");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(model.tick(0));
        let interval = self.frame_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            let mut seq = 1u64;
            loop {
                ticker.tick().await;
                if tx.send(model.tick(seq)).is_err() {
                    break;
                }
                seq += 1;
            }
        });
        let abort = task.abort_handle();

        *active = Some((id, task));
        debug!(animation = id, "graph animation started");
        AnimationHandle { id, frames: rx, task: abort }
    }

    pub fn stop(&self, handle: &AnimationHandle) {
        handle.task.abort();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().map(|(id, _)| *id) == Some(handle.id) {
            *active = None;
        }
    }

    pub fn active_id(&self) -> Option<u64> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).as_ref().map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn caption() -> GraphCaption { GraphCaption { total_accounts: TOTAL_NODES, bot_percentage: 30, coord_score: 0.8 } }

    fn node(x: f64, y: f64, class: NodeClass) -> GraphNode { GraphNode { x, y, vx: 0.0, vy: 0.0, radius: 10.0, class } }

    #[test]
    fn population_from_signals() {
        assert_eq!(NodeCounts::from_signals(30, 0.8), NodeCounts { verified: 7, suspicious: 4, bot: 4 });
        assert_eq!(NodeCounts::from_signals(5, 0.25), NodeCounts { verified: 14, suspicious: 1, bot: 0 });
    }

    #[test]
    fn adversarial_population_is_clamped_to_fifteen() {
        let c = NodeCounts::from_signals(95, 0.99);
        assert_eq!(c, NodeCounts { verified: 0, suspicious: 1, bot: 14 });
        let c = NodeCounts::from_signals(400, 3.0);
        assert_eq!(c, NodeCounts { verified: 0, suspicious: 0, bot: 15 });
        assert_eq!(NodeCounts::from_signals(0, -1.0).verified, 15);
    }

    #[test]
    fn generated_nodes_respect_class_ranges() {
        let mut rng = StdRng::seed_from_u64(11);
        let canvas = CanvasSize::default();
        let model = GraphModel::generate(NodeCounts::from_signals(30, 0.8), canvas, caption(), &mut rng);
        assert_eq!(model.nodes().len(), 15);
        for n in model.nodes() {
            let (r0, r1) = n.class.radius_range();
            assert!(n.radius >= r0 && n.radius <= r1);
            assert!(n.x >= SPAWN_MARGIN && n.x <= canvas.width - SPAWN_MARGIN);
            assert!(n.y >= SPAWN_MARGIN && n.y <= canvas.height - SPAWN_MARGIN);
            assert!(n.vx.abs() <= n.class.max_speed() && n.vy.abs() <= n.class.max_speed());
        }
    }

    #[test]
    fn edge_threshold_depends_on_classes() {
        let canvas = CanvasSize::default();
        let nodes = vec![
            node(100.0, 100.0, NodeClass::Bot),
            node(250.0, 100.0, NodeClass::Suspicious), // 150 from bot: strong edge
            node(100.0, 250.0, NodeClass::Verified),   // 150 from bot: too far for weak
            node(100.0, 350.0, NodeClass::Verified),   // 100 from verified: weak edge
        ];
        let edges = GraphModel::from_nodes(nodes, canvas, caption()).edges();
        let pairs: Vec<(usize, usize, bool)> = edges.iter().map(|e| (e.a, e.b, e.strong)).collect();
        assert_eq!(pairs, [(0, 1, true), (2, 3, false)]);
        assert!((edges[0].opacity - 0.05).abs() < 1e-9);
        assert!((edges[1].opacity - (0.2 - 100.0 / 600.0)).abs() < 1e-9);
    }

    #[test]
    fn nodes_reflect_at_bounds() {
        let canvas = CanvasSize { width: 100.0, height: 100.0 };
        let mut n = node(89.8, 50.0, NodeClass::Verified);
        n.vx = 0.5;
        n.vy = -0.2;
        let mut model = GraphModel::from_nodes(vec![n], canvas, caption());
        model.step();
        let moved = model.nodes()[0];
        assert_eq!(moved.vx, -0.5);
        assert_eq!(moved.vy, -0.2);
        for _ in 0..2000 { model.step(); }
        let n = model.nodes()[0];
        assert!(n.x >= n.radius - 1.0 && n.x <= 100.0 - n.radius + 1.0);
        assert!(n.y >= n.radius - 1.0 && n.y <= 100.0 - n.radius + 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn new_animation_supersedes_previous() {
        let sim = GraphSimulator::default();
        let mut rng = StdRng::seed_from_u64(5);
        let counts = NodeCounts::from_signals(30, 0.8);
        let mut first = sim.render(counts, CanvasSize::default(), caption(), &mut rng);
        assert!(first.next_frame().await.is_some());

        let mut second = sim.render(counts, CanvasSize::default(), caption(), &mut rng);
        tokio::task::yield_now().await;
        assert!(first.next_frame().await.is_none());
        assert!(first.is_finished());
        assert_eq!(sim.active_id(), Some(second.id()));

        let f = second.next_frame().await.unwrap();
        assert_eq!(f.nodes.len(), 15);
        sim.stop(&second);
        assert_eq!(sim.active_id(), None);
        assert!(second.next_frame().await.is_none());
    }
}
