mod advert_tests;
mod common;
