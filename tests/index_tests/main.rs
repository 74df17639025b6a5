//! Index table segment tests
