mod helpers;
mod requests;
mod session;
mod subscription;
