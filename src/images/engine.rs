// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::bindings::{InstanceBinding, InstanceResources, Reallocation};
use crate::images::behavior::BehaviorQueue;
use crate::images::options::AquariumOptions;
use crate::images::scene::{PseudoRandom, SPECIES, SPECIES_COUNT, Species, distribute_fish, fish_motion, species_offsets};
use crate::imp::{self, Device};
use crate::staging::{BufferManager, PoolStats};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/**
Drives the staging pool and instance store one frame at a time.

Each frame the engine applies any scripted population change, regrows instance storage
if the population passed its peak, computes every fish's uniforms, stages them through
the pool and submits.
*/
pub struct Engine<D: Device> {
    //drop order: pool and instances release device objects before the device
    pool: BufferManager<D>,
    instances: InstanceResources<D>,
    device: Arc<D>,
    options: AquariumOptions,
    behaviors: BehaviorQueue,
    fish_count: usize,
    previous_fish_count: usize,
    species_counts: [usize; SPECIES_COUNT],
    species_offsets: [usize; SPECIES_COUNT],
    clock: f64,
    frame: u64,
    rng: PseudoRandom,
}

/// What happened during one [Engine::render_frame].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub fish_count: usize,
    pub draws: usize,
    pub reallocation: Reallocation,
    /// The instance upload was refused by the pool and skipped this frame.
    pub upload_dropped: bool,
}

/// One fish draw.
pub struct Draw<'a, D: Device> {
    pub species: &'static Species,
    /// Slot in the instance store.
    pub instance: usize,
    pub binding: InstanceBinding<'a, D>,
}

impl<D: Device> Debug for Draw<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draw")
            .field("species", &self.species.name)
            .field("instance", &self.instance)
            .field("binding", &self.binding)
            .finish()
    }
}

impl<D: Device> Debug for Engine<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("frame", &self.frame)
            .field("fish_count", &self.fish_count)
            .field("pool", &self.pool)
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}

impl<D: Device> Engine<D> {
    pub fn new(device: Arc<D>, options: AquariumOptions) -> Result<Self, CreateError> {
        let pool_config = options.pool_config();
        if pool_config.max_buffer_count == 0 {
            return Err(CreateError::Pool("max_buffer_count must be at least 1"));
        }
        if pool_config.per_buffer_bytes() == 0 {
            return Err(CreateError::Pool("capacity_bytes is smaller than max_buffer_count"));
        }
        let pool = BufferManager::new(device.clone(), pool_config);
        let instances = InstanceResources::new(device.clone());
        let behaviors = if options.simulate_fish_come_and_go {
            BehaviorQueue::new(options.behaviors.iter().copied())
        } else {
            BehaviorQueue::default()
        };
        logwise::info_sync!(
            "Aquarium engine with {fish} fish, dynamic offsets {dynamic}",
            fish = options.fish_count,
            dynamic = logwise::privacy::LogIt(&options.dynamic_buffer_offset)
        );
        Ok(Engine {
            pool,
            instances,
            device,
            fish_count: options.fish_count,
            options,
            behaviors,
            previous_fish_count: 0,
            species_counts: [0; SPECIES_COUNT],
            species_offsets: [0; SPECIES_COUNT],
            clock: 0.0,
            frame: 0,
            rng: PseudoRandom::new(),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn options(&self) -> &AquariumOptions {
        &self.options
    }

    pub fn fish_count(&self) -> usize {
        self.fish_count
    }

    /// Fish per species, indexed like [SPECIES].
    pub fn species_counts(&self) -> &[usize; SPECIES_COUNT] {
        &self.species_counts
    }

    pub fn pool(&self) -> &BufferManager<D> {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn instances(&self) -> &InstanceResources<D> {
        &self.instances
    }

    /// Seconds of simulated time.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /**
    Renders one frame after `elapsed_seconds` of wall time.

    # Errors
    Fails only if the device cannot create instance storage.  A refused upload is logged
    and reported in [FrameReport::upload_dropped]; the next frame tries again.
    */
    pub fn render_frame(&mut self, elapsed_seconds: f64) -> Result<FrameReport, imp::Error> {
        //deliver remap completions that arrived since the last frame
        self.pool.poll();
        self.clock += elapsed_seconds;
        self.rng.reset();
        self.fish_count = self.behaviors.step(self.fish_count);

        let mut reallocation = Reallocation::Unchanged;
        if self.fish_count != self.previous_fish_count {
            self.species_counts = distribute_fish(self.fish_count);
            self.species_offsets = species_offsets(&self.species_counts);
            reallocation = self.instances.reallocate(
                self.previous_fish_count,
                self.fish_count,
                self.options.dynamic_buffer_offset,
            )?;
            self.previous_fish_count = self.fish_count;
        }

        for (species_index, species) in SPECIES.iter().enumerate() {
            let base = self.species_offsets[species_index];
            for fish in 0..self.species_counts[species_index] {
                let per = fish_motion(species, self.clock, fish, &mut self.rng);
                self.instances.set_instance(base + fish, per);
            }
        }

        let upload_dropped = match self.instances.upload(&mut self.pool) {
            Ok(_) => false,
            Err(e) => {
                logwise::warn_sync!(
                    "Skipping fish upload this frame: {err}",
                    err = logwise::privacy::LogIt(&e)
                );
                true
            }
        };

        let draws = self.draws().count();
        self.pool.flush();
        self.frame += 1;
        Ok(FrameReport {
            frame: self.frame,
            fish_count: self.fish_count,
            draws,
            reallocation,
            upload_dropped,
        })
    }

    /// Draws for the current population, species by species.
    pub fn draws(&self) -> impl Iterator<Item = Draw<'_, D>> + '_ {
        SPECIES.iter().enumerate().flat_map(move |(species_index, species)| {
            let base = self.species_offsets[species_index];
            (base..base + self.species_counts[species_index]).filter_map(move |instance| {
                self.instances.binding(instance).map(|binding| Draw {
                    species,
                    instance,
                    binding,
                })
            })
        })
    }

    /// Releases every staging buffer and the instance store.
    pub fn dispose(&mut self) {
        self.pool.dispose();
        self.instances.dispose();
        self.previous_fish_count = 0;
        self.species_counts = [0; SPECIES_COUNT];
        self.species_offsets = [0; SPECIES_COUNT];
    }
}

#[cfg(feature = "backend_wgpu")]
impl Engine<imp::WgpuDevice> {
    /// Creates an engine on the first adapter wgpu offers.
    pub async fn with_wgpu(options: AquariumOptions) -> Result<Self, CreateError> {
        let device = Arc::new(imp::WgpuDevice::new().await?);
        Self::new(device, options)
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CreateError {
    #[error("Invalid pool configuration: {0}")]
    Pool(&'static str),
    #[error("Implementation error {0}")]
    Imp(#[from] imp::Error),
}
