pub mod descriptor_set_layout_builder;
