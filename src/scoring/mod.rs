// Scoring: the aggregation policy shared by every input modality.

pub mod verdict;
