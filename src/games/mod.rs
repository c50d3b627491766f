pub mod azul;
