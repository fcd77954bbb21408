mod address;
mod codec;
