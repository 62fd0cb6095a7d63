
mod connectivity;
mod equivalence;
mod hierarchy;
mod persistence;
mod schematic;
