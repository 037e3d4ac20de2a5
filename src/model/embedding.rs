//! Embedding layers for speed modelling
//!
//! Implements:
//! - Embedding Composer (position, week, day, hour and minute lookup tables)
//! - Spatio-temporal embedding (projected position plus projected time)

use candle_core::{Result, Tensor};
use candle_nn::{embedding, Embedding, Module, VarBuilder};

use super::fc::{Activation, FullyConnected};

/// Vocabulary sizes of the categorical time fields
pub struct TimeVocab;

impl TimeVocab {
    pub const WEEK: usize = 5;
    pub const DAY: usize = 31;
    pub const HOUR: usize = 24;
    pub const MINUTE: usize = 4;
}

/// Composed embeddings, each `[batch, total_length, site_num, emb_size]`
pub struct SpeedEmbeddings {
    pub position: Tensor,
    pub week: Tensor,
    pub day: Tensor,
    pub hour: Tensor,
    pub minute: Tensor,
}

impl SpeedEmbeddings {
    /// Temporal embedding fed to the network: hour plus minute
    ///
    /// Week and day are looked up but stay out of the sum.
    pub fn time(&self) -> Result<Tensor> {
        &self.hour + &self.minute
    }
}

/// Lookup tables for every categorical field
pub struct EmbeddingComposer {
    position: Embedding,
    week: Embedding,
    day: Embedding,
    hour: Embedding,
    minute: Embedding,
    total_length: usize,
    site_num: usize,
    emb_size: usize,
}

impl EmbeddingComposer {
    /// Create the composer
    pub fn new(site_num: usize, emb_size: usize, total_length: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            position: embedding(site_num, emb_size, vb.pp("position_embed"))?,
            week: embedding(TimeVocab::WEEK, emb_size, vb.pp("week_embed"))?,
            day: embedding(TimeVocab::DAY, emb_size, vb.pp("day_embed"))?,
            hour: embedding(TimeVocab::HOUR, emb_size, vb.pp("hour_embed"))?,
            minute: embedding(TimeVocab::MINUTE, emb_size, vb.pp("minute_embed"))?,
            total_length,
            site_num,
            emb_size,
        })
    }

    /// Look up a time field `[batch * total_length, site_num]` and fold the
    /// rows back into `[batch, total_length, site_num, emb_size]`
    fn time_field(&self, table: &Embedding, ids: &Tensor, batch: usize) -> Result<Tensor> {
        table
            .forward(ids)?
            .reshape((batch, self.total_length, self.site_num, self.emb_size))
    }

    /// Compose all embeddings for a batch
    ///
    /// `position` is `[1, site_num]`; the time fields are
    /// `[batch * total_length, site_num]`.
    pub fn forward(
        &self,
        position: &Tensor,
        week: &Tensor,
        day: &Tensor,
        hour: &Tensor,
        minute: &Tensor,
        batch: usize,
    ) -> Result<SpeedEmbeddings> {
        // [1, site_num, emb] -> tiled over batch and time
        let position = self
            .position
            .forward(position)?
            .unsqueeze(0)?
            .broadcast_as((batch, self.total_length, self.site_num, self.emb_size))?
            .contiguous()?;

        Ok(SpeedEmbeddings {
            position,
            week: self.time_field(&self.week, week, batch)?,
            day: self.time_field(&self.day, day, batch)?,
            hour: self.time_field(&self.hour, hour, batch)?,
            minute: self.time_field(&self.minute, minute, batch)?,
        })
    }
}

/// Spatio-temporal embedding: `FC(position) + FC(time)`
pub struct STEmbedding {
    spatial: FullyConnected,
    temporal: FullyConnected,
}

impl STEmbedding {
    pub fn new(emb_size: usize, vb: VarBuilder) -> Result<Self> {
        let units = [emb_size, emb_size];
        let activations = [Activation::Relu, Activation::Linear];
        Ok(Self {
            spatial: FullyConnected::new(emb_size, &units, &activations, vb.pp("spatial"))?,
            temporal: FullyConnected::new(emb_size, &units, &activations, vb.pp("temporal"))?,
        })
    }

    /// Output shape: `[batch, total_length, site_num, emb_size]`
    pub fn forward(&self, embeddings: &SpeedEmbeddings) -> Result<Tensor> {
        let se = self.spatial.forward(&embeddings.position)?;
        let te = self.temporal.forward(&embeddings.time()?)?;
        se + te
    }
}
