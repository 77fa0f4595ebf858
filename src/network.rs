//! The contact network between people.
//!
//! People are partitioned into equal blocks (one per neighbourhood). Within a block, people are
//! connected by a ring lattice, optionally rewired once into a small-world graph; this is the
//! *base* network and it never changes after setup. Each day the *working* network starts as a
//! copy of the base, gains a few ephemeral cross-block edges, and has every quarantined person
//! cut off from everyone else.
//!
//! The matrix is dense: fine for populations in the hundreds, which is what this model runs at.
use log::{debug, info};

use crate::context::Context;
use crate::error::TraceNetError;
use crate::parameters::ContextParametersExt;
use crate::people::{ContextPeopleExt, PersonId};
use crate::rand::Rng;
use crate::random::{
    sample_multiple_from_known_length, sample_single_from_known_length, ContextRandomExt,
};
use crate::{define_data_plugin, define_rng};

/// A symmetric boolean adjacency matrix over `size` nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    size: usize,
    cells: Vec<bool>,
}

impl AdjacencyMatrix {
    #[must_use]
    pub fn new(size: usize) -> Self {
        AdjacencyMatrix {
            size,
            cells: vec![false; size * size],
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.cells[i * self.size + j]
    }

    pub fn add_edge(&mut self, i: usize, j: usize) {
        debug_assert_ne!(i, j, "self-loops are not allowed");
        self.cells[i * self.size + j] = true;
        self.cells[j * self.size + i] = true;
    }

    pub fn remove_edge(&mut self, i: usize, j: usize) {
        self.cells[i * self.size + j] = false;
        self.cells[j * self.size + i] = false;
    }

    /// Removes every edge touching `i`.
    pub fn isolate(&mut self, i: usize) {
        for j in 0..self.size {
            self.remove_edge(i, j);
        }
    }

    #[must_use]
    pub fn row(&self, i: usize) -> &[bool] {
        &self.cells[i * self.size..(i + 1) * self.size]
    }

    pub fn neighbours(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.row(i)
            .iter()
            .enumerate()
            .filter_map(|(j, &connected)| connected.then_some(j))
    }

    #[must_use]
    pub fn degree(&self, i: usize) -> usize {
        self.row(i).iter().filter(|&&connected| connected).count()
    }

    /// All edges as `(i, j)` pairs with `i < j`, in row order.
    #[must_use]
    pub fn edges(&self) -> Vec<(usize, usize)> {
        (0..self.size)
            .flat_map(|i| self.neighbours(i).filter(move |&j| j > i).map(move |j| (i, j)))
            .collect()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.cells.iter().filter(|&&connected| connected).count() / 2
    }

    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| (0..i).all(|j| self.has_edge(i, j) == self.has_edge(j, i)))
    }
}

/// Outcome of a rewiring pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RewireStats {
    pub considered: usize,
    /// Edges whose far endpoint changed.
    pub rewired: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ContactNetwork {
    base: AdjacencyMatrix,
    working: AdjacencyMatrix,
    block_size: usize,
    masked: Vec<bool>,
}

impl ContactNetwork {
    /// An empty network of `block_count` blocks of `block_size` nodes each.
    #[must_use]
    pub fn new(block_count: usize, block_size: usize) -> Self {
        let size = block_count * block_size;
        ContactNetwork {
            base: AdjacencyMatrix::new(size),
            working: AdjacencyMatrix::new(size),
            block_size,
            masked: vec![false; size],
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.working.size()
    }

    #[must_use]
    pub fn block_of(&self, node: usize) -> usize {
        node / self.block_size
    }

    fn block_range(&self, block: usize) -> std::ops::Range<usize> {
        block * self.block_size..(block + 1) * self.block_size
    }

    #[must_use]
    pub fn base(&self) -> &AdjacencyMatrix {
        &self.base
    }

    #[must_use]
    pub fn working(&self) -> &AdjacencyMatrix {
        &self.working
    }

    #[must_use]
    pub fn is_masked(&self, node: usize) -> bool {
        self.masked[node]
    }

    /// Connects every node to its `k / 2` nearest neighbours on each side within its block,
    /// wrapping around the block.
    ///
    /// # Errors
    /// Returns `TraceNetError::InvalidArgument` if `k` is odd or not smaller than the block size.
    pub fn make_ring_lattice(&mut self, k: usize) -> Result<(), TraceNetError> {
        if k % 2 != 0 {
            return Err(TraceNetError::InvalidArgument(format!(
                "ring lattice degree must be even, got {k}"
            )));
        }
        if k >= self.block_size {
            return Err(TraceNetError::InvalidArgument(format!(
                "ring lattice degree {k} must be smaller than the block size {}",
                self.block_size
            )));
        }
        let block_count = self.size() / self.block_size;
        for block in 0..block_count {
            let start = block * self.block_size;
            for i in 0..self.block_size {
                for offset in 1..=k / 2 {
                    let j = (i + offset) % self.block_size;
                    self.working.add_edge(start + i, start + j);
                }
            }
        }
        Ok(())
    }

    /// Watts-Strogatz rewiring within blocks. Each existing edge `(i, j)` is, with probability
    /// `p`, removed and replaced by an edge from `i` to a node of the same block chosen
    /// uniformly among those not already adjacent to `i`. The removed endpoint `j` is one of
    /// those nodes, so the edge count never changes.
    pub fn rewire_edges<R: Rng>(&mut self, p: f64, rng: &mut R) -> RewireStats {
        let edges = self.working.edges();
        let mut stats = RewireStats {
            considered: edges.len(),
            ..RewireStats::default()
        };

        for (i, j) in edges {
            if !rng.random_bool(p) {
                continue;
            }
            self.working.remove_edge(i, j);
            let candidates: Vec<usize> = self
                .block_range(self.block_of(i))
                .filter(|&c| c != i && !self.working.has_edge(i, c))
                .collect();
            let c = sample_single_from_known_length(rng, candidates.into_iter()).unwrap_or(j);
            self.working.add_edge(i, c);
            if c != j {
                stats.rewired += 1;
            }
        }
        stats
    }

    /// Makes the current working matrix the persisted base.
    pub fn commit_base(&mut self) {
        self.base = self.working.clone();
    }

    /// Gives `floor(n * percentage / 100)` unmasked nodes, drawn without replacement, one edge
    /// each to an unmasked node in a different block that they are not already adjacent to.
    /// Returns the number of edges added.
    pub fn make_ephemeral_contacts<R: Rng>(&mut self, percentage: f64, rng: &mut R) -> usize {
        let size = self.size();
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let requested = (size as f64 * percentage / 100.0).floor() as usize;
        let eligible: Vec<usize> = (0..size).filter(|&node| !self.masked[node]).collect();
        let chosen = sample_multiple_from_known_length(rng, eligible, requested);

        let mut added = 0;
        for i in chosen {
            let block = self.block_of(i);
            let candidates: Vec<usize> = (0..size)
                .filter(|&c| {
                    self.block_of(c) != block && !self.masked[c] && !self.working.has_edge(i, c)
                })
                .collect();
            if let Some(c) = sample_single_from_known_length(rng, candidates.into_iter()) {
                self.working.add_edge(i, c);
                added += 1;
            } else {
                debug!("no ephemeral contact candidate for node {i}");
            }
        }
        added
    }

    /// Cuts every node in `quarantined` off from the working network.
    pub fn apply_quarantine_mask(&mut self, quarantined: &[usize]) {
        for &node in quarantined {
            self.masked[node] = true;
            self.working.isolate(node);
        }
    }

    /// Resets the working network to the base, dropping ephemeral edges and the mask.
    pub fn revert_to_base(&mut self) {
        self.working.clone_from(&self.base);
        self.masked.fill(false);
    }
}

#[derive(Default)]
struct NetworkData {
    network: ContactNetwork,
}

define_data_plugin!(NetworkPlugin, NetworkData, NetworkData::default());

define_rng!(NetworkRng);
define_rng!(EphemeralContactRng);

fn with_network_mut<T>(
    context: &mut Context,
    f: impl FnOnce(&Context, &mut ContactNetwork) -> T,
) -> T {
    let mut network = std::mem::take(&mut context.get_data_container_mut(NetworkPlugin).network);
    let result = f(&*context, &mut network);
    context.get_data_container_mut(NetworkPlugin).network = network;
    result
}

pub trait ContextNetworkExt {
    /// Builds the base network from the parameters: a ring lattice in each neighbourhood,
    /// then small-world rewiring. Requires parameters, randomness and the population.
    ///
    /// # Errors
    /// Returns `TraceNetError::InvalidArgument` if the lattice cannot be built.
    fn init_network(&mut self) -> Result<RewireStats, TraceNetError>;

    fn get_network(&self) -> &ContactNetwork;

    /// The people `person_id` is connected to in today's working network.
    fn get_contacts(&self, person_id: PersonId) -> Vec<PersonId>;

    /// Adds today's ephemeral cross-neighbourhood edges. Returns how many were added.
    fn make_ephemeral_contacts(&mut self) -> usize;

    /// Cuts every currently quarantined person off from the working network.
    fn apply_quarantine_mask(&mut self);

    /// Resets the working network to the base and, if quarantining is enabled, re-applies the
    /// quarantine mask.
    fn revert_network(&mut self);
}

impl ContextNetworkExt for Context {
    fn init_network(&mut self) -> Result<RewireStats, TraceNetError> {
        let parameters = self.get_parameters().clone();
        let mut network = ContactNetwork::new(
            parameters.neighbourhood_count,
            parameters.residents_per_neighbourhood,
        );
        network.make_ring_lattice(parameters.connection_degree)?;
        let stats = self.sample(NetworkRng, |rng| {
            network.rewire_edges(parameters.rewire_probability, rng)
        });
        network.commit_base();
        info!(
            "built contact network: {} nodes, {} edges ({} of {} rewired)",
            network.size(),
            network.base().edge_count(),
            stats.rewired,
            stats.considered
        );
        self.get_data_container_mut(NetworkPlugin).network = network;
        Ok(stats)
    }

    fn get_network(&self) -> &ContactNetwork {
        &self
            .get_data_container(NetworkPlugin)
            .expect("Network must be initialized with init_network")
            .network
    }

    fn get_contacts(&self, person_id: PersonId) -> Vec<PersonId> {
        self.get_network()
            .working()
            .neighbours(person_id.0)
            .map(PersonId)
            .collect()
    }

    fn make_ephemeral_contacts(&mut self) -> usize {
        let percentage = self.get_parameters().ephemeral_contact_percentage;
        with_network_mut(self, |context, network| {
            context.sample(EphemeralContactRng, |rng| {
                network.make_ephemeral_contacts(percentage, rng)
            })
        })
    }

    fn apply_quarantine_mask(&mut self) {
        let quarantined: Vec<usize> = self
            .get_quarantined_people()
            .into_iter()
            .map(|person_id| person_id.0)
            .collect();
        self.get_data_container_mut(NetworkPlugin)
            .network
            .apply_quarantine_mask(&quarantined);
    }

    fn revert_network(&mut self) {
        self.get_data_container_mut(NetworkPlugin)
            .network
            .revert_to_base();
        if self.get_parameters().include_quarantining {
            self.apply_quarantine_mask();
        }
    }
}
