mod client;
mod message;
mod protocol;
mod storage;
mod transport;
