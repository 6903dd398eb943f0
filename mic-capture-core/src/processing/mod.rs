pub mod buffer_queue;
pub mod pcm_format;
