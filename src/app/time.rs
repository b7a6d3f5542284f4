use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type TickKey = u64;

/// Longest frame the simulation will step through, in seconds. Longer gaps (a minimized window,
/// a debugger pause) are cut down to this so fixed ticks and movement don't catch up in one burst.
pub const MAX_FRAME_TIME: f32 = 0.25;

type TickDelegate<C> = Box<dyn FnMut(&mut C, f32)>;

/// Callbacks run once per fixed step. `C` is whatever the delegates get to mutate.
pub struct TickRegistry<C> {
    delegates: Vec<(TickKey, TickDelegate<C>)>,
    indices: HashMap<TickKey, usize>,
    next_key: TickKey,
}

impl<C> Default for TickRegistry<C> {
    fn default() -> Self {
        Self {
            delegates: Vec::new(),
            indices: HashMap::new(),
            next_key: 0,
        }
    }
}

impl<C> TickRegistry<C> {
    pub fn add(&mut self, delegate: impl FnMut(&mut C, f32) + 'static) -> TickKey {
        let key = self.next_key;
        self.next_key += 1;

        self.indices.insert(key, self.delegates.len());
        self.delegates.push((key, Box::new(delegate)));
        key
    }

    /// Returns false if the key was never registered or is already removed.
    pub fn remove(&mut self, key: TickKey) -> bool {
        let Some(index) = self.indices.remove(&key) else {
            return false;
        };

        self.delegates.swap_remove(index);
        if let Some((moved_key, _)) = self.delegates.get(index) {
            self.indices.insert(*moved_key, index);
        }
        true
    }

    pub fn contains(&self, key: TickKey) -> bool {
        self.indices.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub fn tick_all(&mut self, context: &mut C, step: f32) {
        for (_, delegate) in self.delegates.iter_mut() {
            delegate(context, step);
        }
    }
}

pub struct TimeManager<C> {
    last_frame: Instant,
    delta_time: f32,

    fps: u32,
    frames_this_second: u32,
    fps_timer: f32,

    fixed_step: f32,
    accumulator: f32,

    pub ticks: TickRegistry<C>,
}

impl<C> TimeManager<C> {
    pub fn new(fixed_step: f32) -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            fps: 0,
            frames_this_second: 0,
            fps_timer: 0.0,
            fixed_step,
            accumulator: 0.0,
            ticks: TickRegistry::default(),
        }
    }

    /// Measures the time since the previous call and runs the fixed steps it covers.
    pub fn update(&mut self, context: &mut C) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.advance(elapsed, context)
    }

    /// Advances by `elapsed`, capped at [`MAX_FRAME_TIME`], and returns the seconds simulated
    pub fn advance(&mut self, elapsed: Duration, context: &mut C) -> f32 {
        let elapsed = elapsed.as_secs_f32();
        if elapsed > MAX_FRAME_TIME {
            log::debug!("Frame took {:.3}s, simulating {}s", elapsed, MAX_FRAME_TIME);
        }
        self.delta_time = elapsed.min(MAX_FRAME_TIME);

        self.frames_this_second += 1;
        self.fps_timer += elapsed;
        if self.fps_timer >= 1.0 {
            self.fps = self.frames_this_second;
            self.frames_this_second = 0;
            self.fps_timer %= 1.0;
            log::debug!("FPS: {}", self.fps);
        }

        if self.fixed_step > 0.0 {
            self.accumulator += self.delta_time;
            while self.accumulator >= self.fixed_step {
                self.ticks.tick_all(context, self.fixed_step);
                self.accumulator -= self.fixed_step;
            }
        }

        self.delta_time
    }

    pub fn get_delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn get_fps(&self) -> u32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn keys_are_unique_and_never_reused() {
        let mut registry = TickRegistry::<()>::default();
        let a = registry.add(|_, _| {});
        let b = registry.add(|_, _| {});
        assert_ne!(a, b);

        assert!(registry.remove(a));
        let c = registry.add(|_, _| {});
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_reindexes_moved_delegate() {
        let mut registry = TickRegistry::<Vec<u32>>::default();
        let first = registry.add(|log, _| log.push(1));
        let _second = registry.add(|log, _| log.push(2));
        let third = registry.add(|log, _| log.push(3));

        // The last delegate moves into the removed slot and must still be removable
        assert!(registry.remove(first));
        assert!(registry.contains(third));
        assert!(registry.remove(third));
        assert!(!registry.remove(third));
        assert!(!registry.remove(first));

        let mut log = Vec::new();
        registry.tick_all(&mut log, 0.1);
        assert_eq!(log, vec![2]);
    }

    #[test]
    fn remove_unknown_key() {
        let mut registry = TickRegistry::<()>::default();
        assert!(!registry.remove(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn runs_one_tick_per_whole_fixed_step() {
        let mut time = TimeManager::<u32>::new(0.01);
        time.ticks.add(|count, _| *count += 1);

        let mut count = 0;
        time.advance(ms(35), &mut count);
        assert_eq!(count, 3);

        // Carried 5ms plus 6ms covers one more step
        time.advance(ms(6), &mut count);
        assert_eq!(count, 4);
    }

    #[test]
    fn tick_delegates_receive_the_fixed_step() {
        let mut time = TimeManager::<Vec<f32>>::new(1.0 / 64.0);
        time.ticks.add(|steps, step| steps.push(step));

        let mut steps = Vec::new();
        time.advance(ms(125), &mut steps);
        assert_eq!(steps, vec![1.0 / 64.0; 8]);
    }

    #[test]
    fn fps_is_recomputed_every_second() {
        let mut time = TimeManager::<()>::new(1.0 / 60.0);
        assert_eq!(time.get_fps(), 0);

        for _ in 0..8 {
            time.advance(ms(125), &mut ());
        }
        assert_eq!(time.get_fps(), 8);

        for _ in 0..16 {
            time.advance(Duration::from_micros(62_500), &mut ());
        }
        assert_eq!(time.get_fps(), 16);
    }

    #[test]
    fn delta_time_is_reported_in_seconds() {
        let mut time = TimeManager::<()>::new(1.0 / 60.0);
        let delta = time.advance(ms(250), &mut ());
        assert_abs_diff_eq!(delta, 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(time.get_delta_time(), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn long_pause_is_capped_to_max_frame_time() {
        let mut time = TimeManager::<u32>::new(1.0 / 64.0);
        time.ticks.add(|count, _| *count += 1);

        let mut count = 0;
        let delta = time.advance(Duration::from_secs(300), &mut count);
        assert_eq!(delta, MAX_FRAME_TIME);
        assert_eq!(time.get_delta_time(), MAX_FRAME_TIME);
        assert_eq!(count, 16);

        // The pause still counts as wall time for the FPS counter
        assert_eq!(time.get_fps(), 1);
        for _ in 0..8 {
            time.advance(ms(125), &mut count);
        }
        assert_eq!(time.get_fps(), 8);
    }
}
