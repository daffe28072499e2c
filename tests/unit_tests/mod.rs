mod evaluate;
mod sparse;
mod transforms;
