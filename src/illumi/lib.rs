pub mod fastq_io;
pub mod illumiprocessor;
