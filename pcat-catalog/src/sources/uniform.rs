use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayRef, FixedSizeListArray, Float64Array};
use arrow::datatypes::{DataType, Field};
use pcat_comm::CommRef;
use pcat_compute::LazyArray;
use pcat_result::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{Catalog, CatalogOptions};
use crate::columns::{BaseSource, ColumnProvider, ColumnTable};
use crate::mesh::POSITION;

pub const VELOCITY: &str = "Velocity";

/// Fraction of the box spanned by the random velocity components.
const VELOCITY_SCALE: f64 = 0.01;

/// Particles uniformly distributed in a periodic box.
///
/// `Position` is uniform in `[0, BoxSize)` per axis and `Velocity` uniform in
/// `[0, 0.01 * BoxSize)`. Each rank draws from its own stream derived from the
/// seed and its rank, so a given `(seed, rank, size)` always yields the same rows.
pub struct UniformCatalog {
    comm: CommRef,
    box_size: [f64; 3],
    seed: u64,
    position: LazyArray,
    velocity: LazyArray,
}

fn base(_: &UniformCatalog) -> &BaseSource {
    &BaseSource
}

static UNIFORM_TABLE: LazyLock<ColumnTable<UniformCatalog>> = LazyLock::new(|| {
    ColumnTable::<UniformCatalog>::new("UniformCatalog")
        .inherit(base)
        .column(POSITION, |source, _| Ok(source.position.clone()))
        .column(VELOCITY, |source, _| Ok(source.velocity.clone()))
});

impl ColumnProvider for UniformCatalog {
    fn column_table() -> &'static ColumnTable<Self> {
        &UNIFORM_TABLE
    }
}

/// Data type of an `N x 3` column.
pub fn vector_type() -> DataType {
    DataType::FixedSizeList(Arc::new(Field::new_list_field(DataType::Float64, false)), 3)
}

fn stream_seed(seed: u64, rank: usize, salt: u64) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((rank as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
        ^ salt
}

fn uniform_vectors(label: &str, len: usize, seed: u64, scale: [f64; 3]) -> LazyArray {
    let field = Arc::new(Field::new_list_field(DataType::Float64, false));
    LazyArray::generate(
        label,
        len,
        vector_type(),
        Arc::new(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let values: Vec<f64> = (0..len * 3)
                .map(|i| rng.random::<f64>() * scale[i % 3])
                .collect();
            let list = FixedSizeListArray::try_new(
                Arc::clone(&field),
                3,
                Arc::new(Float64Array::from(values)),
                None,
            )?;
            Ok(Arc::new(list) as ArrayRef)
        }),
    )
}

impl UniformCatalog {
    /// Source for `local_size` rows on the calling rank of `comm`.
    pub fn new(comm: CommRef, local_size: usize, box_size: [f64; 3], seed: u64) -> Self {
        let rank = comm.rank();
        let velocity_scale = box_size.map(|l| l * VELOCITY_SCALE);
        Self {
            comm,
            box_size,
            seed,
            position: uniform_vectors(POSITION, local_size, stream_seed(seed, rank, 1), box_size),
            velocity: uniform_vectors(
                VELOCITY,
                local_size,
                stream_seed(seed, rank, 2),
                velocity_scale,
            ),
        }
    }

    /// Communicator whose rank selected the random streams. Catalogs over this
    /// source must use it.
    pub fn comm(&self) -> &CommRef {
        &self.comm
    }

    pub fn box_size(&self) -> [f64; 3] {
        self.box_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Build the catalog on the source's communicator, recording `BoxSize` and
    /// `seed` in its attributes. Collective.
    pub fn into_catalog(self, options: CatalogOptions) -> Result<Catalog> {
        let comm = Arc::clone(&self.comm);
        let local_size = self.position.len();
        let (box_size, seed) = (self.box_size, self.seed);
        let catalog = Catalog::new(self, comm, local_size, options)?;
        catalog.set_attr("BoxSize", box_size);
        catalog.set_attr("seed", seed);
        Ok(catalog)
    }
}
