pub mod dispatch_steps;
