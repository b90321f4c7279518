pub mod msg_log;
