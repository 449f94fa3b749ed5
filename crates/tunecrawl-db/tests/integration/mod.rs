mod common;
mod song_tests;
