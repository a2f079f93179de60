//! Tests that exercise the client against an in-process fake daemon.

mod support;
