//! User-editable breakpoint curve (the LFO waveform editor model).
//!
//! A [`LineGenerator`] holds an x-ordered list of breakpoints in
//! [0,1]×[0,1] and renders them into a lookup table: flat extrapolation
//! before the first and after the last point, linear interpolation in
//! between. Rendering is lazy — a dirty flag is raised by every edit and
//! cleared by the next render.
//!
//! The point list is edited from the UI thread and consumed from the
//! audio thread. A mutex guards the list during mutation and render; the
//! audio thread only ever calls [`try_render`](LineGenerator::try_render),
//! so it skips a tick rather than wait on a UI-held lock, and table
//! *lookup* (done by the LFO on its own rendered copy) never locks at all.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use halcyon_core::StateNode;

/// One breakpoint of the curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinePoint {
    /// Horizontal position in [0, 1].
    pub x: f32,
    /// Value in [0, 1].
    pub y: f32,
}

impl LinePoint {
    /// Creates a point, clamping both coordinates into [0, 1].
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }
}

/// Breakpoint list with dirty-flag lazy rendering.
///
/// # Example
///
/// ```rust
/// use halcyon_synth::line::{LineGenerator, LinePoint};
///
/// let line = LineGenerator::new();
/// line.init_saw_up();
///
/// let mut table = vec![0.0; 256];
/// assert!(line.is_dirty());
/// line.render(&mut table);
/// assert!(!line.is_dirty());
/// assert!(table[255] > table[0]);
/// ```
#[derive(Debug)]
pub struct LineGenerator {
    points: Mutex<Vec<LinePoint>>,
    dirty: AtomicBool,
}

impl Default for LineGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl LineGenerator {
    /// Creates a generator with the default one-peak shape.
    pub fn new() -> Self {
        let generator = Self {
            points: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(true),
        };
        generator.init_one_peak();
        generator
    }

    fn replace(&self, points: Vec<LinePoint>) {
        *self.points.lock().expect("line generator lock") = points;
        self.dirty.store(true, Ordering::Release);
    }

    /// Rising ramp from (0,0) to (1,1).
    pub fn init_saw_up(&self) {
        self.replace(vec![LinePoint::new(0.0, 0.0), LinePoint::new(1.0, 1.0)]);
    }

    /// Falling ramp from (0,1) to (1,0).
    pub fn init_saw_down(&self) {
        self.replace(vec![LinePoint::new(0.0, 1.0), LinePoint::new(1.0, 0.0)]);
    }

    /// Single peak at the centre (the default shape).
    pub fn init_one_peak(&self) {
        self.replace(vec![
            LinePoint::new(0.0, 0.0),
            LinePoint::new(0.5, 1.0),
            LinePoint::new(1.0, 0.0),
        ]);
    }

    /// Triangle starting and ending at mid level.
    pub fn init_triangle(&self) {
        self.replace(vec![
            LinePoint::new(0.0, 0.5),
            LinePoint::new(0.25, 1.0),
            LinePoint::new(0.75, 0.0),
            LinePoint::new(1.0, 0.5),
        ]);
    }

    /// Square: high half, low half.
    pub fn init_square(&self) {
        self.replace(vec![
            LinePoint::new(0.0, 1.0),
            LinePoint::new(0.5, 1.0),
            LinePoint::new(0.5, 0.0),
            LinePoint::new(1.0, 0.0),
        ]);
    }

    /// Inserts a point, keeping the list ordered by x. Returns the index
    /// the point landed at.
    pub fn insert(&self, point: LinePoint) -> usize {
        let mut points = self.points.lock().expect("line generator lock");
        let index = points
            .iter()
            .position(|p| p.x >= point.x)
            .unwrap_or(points.len());
        points.insert(index, point);
        self.dirty.store(true, Ordering::Release);
        index
    }

    /// Removes a point. The last remaining point cannot be removed;
    /// out-of-range indices are ignored.
    pub fn remove(&self, index: usize) {
        let mut points = self.points.lock().expect("line generator lock");
        if points.len() > 1 && index < points.len() {
            points.remove(index);
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Replaces the point at `index`. Out-of-range indices are ignored.
    pub fn set(&self, index: usize, point: LinePoint) {
        let mut points = self.points.lock().expect("line generator lock");
        if index < points.len() {
            points[index] = point;
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Returns the point at `index`.
    pub fn point(&self, index: usize) -> Option<LinePoint> {
        self.points
            .lock()
            .expect("line generator lock")
            .get(index)
            .copied()
    }

    /// Number of points (always at least 1).
    pub fn len(&self) -> usize {
        self.points.lock().expect("line generator lock").len()
    }

    /// Always false; the list never becomes empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if an edit happened since the last render.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Renders the curve into `table`, blocking on the point lock.
    /// Clears the dirty flag.
    pub fn render(&self, table: &mut [f32]) {
        let points = self.points.lock().expect("line generator lock");
        Self::render_points(&points, table);
        self.dirty.store(false, Ordering::Release);
    }

    /// Non-blocking render for the audio thread: returns `false` without
    /// touching `table` if the UI currently holds the point lock, leaving
    /// the dirty flag raised so a later tick retries.
    pub fn try_render(&self, table: &mut [f32]) -> bool {
        let Ok(points) = self.points.try_lock() else {
            return false;
        };
        Self::render_points(&points, table);
        self.dirty.store(false, Ordering::Release);
        true
    }

    fn render_points(points: &[LinePoint], table: &mut [f32]) {
        let size = table.len();
        if size == 0 {
            return;
        }

        if points.len() == 1 {
            table.fill(points[0].y);
            return;
        }

        let index_of = |x: f32| ((x * size as f32) as usize).min(size);

        // Flat region before the first point.
        let first = &points[0];
        table[..index_of(first.x)].fill(first.y);

        // Linear segments between neighbours.
        for pair in points.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let begin = index_of(prev.x);
            let end = index_of(next.x);
            if end <= begin {
                continue;
            }
            let step = (next.y - prev.y) / (end - begin) as f32;
            let mut value = prev.y;
            for slot in &mut table[begin..end] {
                *slot = value;
                value += step;
            }
        }

        // Flat region after the last point.
        let last = points.last().expect("at least one point");
        table[index_of(last.x)..].fill(last.y);
    }

    /// Writes the point list into a `lineGenerator` child of `node`.
    pub fn save_state(&self, node: &mut StateNode) {
        let points = self.points.lock().expect("line generator lock");
        let line = node.add_child("lineGenerator");
        line.set_usize("numPoints", points.len());
        for point in points.iter() {
            let p = line.add_child("point");
            p.set_f32("x", point.x);
            p.set_f32("y", point.y);
        }
    }

    /// Restores the point list from a `lineGenerator` child of `node`.
    /// A missing child or an empty point list leaves the current shape
    /// untouched. Points are re-sorted by x after loading.
    pub fn load_state(&self, node: &StateNode) {
        let Some(line) = node.child("lineGenerator") else {
            return;
        };

        let mut loaded: Vec<LinePoint> = line
            .children_named("point")
            .map(|p| LinePoint::new(p.f32_attr("x", 0.0), p.f32_attr("y", 0.0)))
            .collect();
        if loaded.is_empty() {
            return;
        }

        loaded.sort_by(|a, b| a.x.total_cmp(&b.x));
        self.replace(loaded);
    }
}
