use burn::data::dataset::Dataset;

use crate::domain::example::FormattedExample;

/// One split of formatted examples, indexable by burn's DataLoader.
#[derive(Debug, Clone, Default)]
pub struct ExampleDataset {
    examples: Vec<FormattedExample>,
}

impl ExampleDataset {
    pub fn new(examples: Vec<FormattedExample>) -> Self { Self { examples } }

    pub fn examples(&self) -> &[FormattedExample] { &self.examples }

    /// Consecutive batches of at most `batch_size` examples, in order.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = &[FormattedExample]> {
        self.examples.chunks(batch_size.max(1))
    }
}

impl Dataset<FormattedExample> for ExampleDataset {
    fn get(&self, index: usize) -> Option<FormattedExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
